//! Position-tolerant per-line fingerprints via a rolling hash.
//!
//! Every line is identified by the rolling hash of the window of
//! `BLOCK_SIZE` normalized characters starting at its first character.
//! Spaces and tabs are ignored and `\r`, `\n` and `\r\n` all count as a
//! single line break, so indentation changes and line-ending conversions do
//! not alter fingerprints, and neither do edits further than `BLOCK_SIZE`
//! characters below a line.
//!
//! Characters are UTF-16 code units of the UTF-8 decoded file, which keeps
//! hashes identical to those computed by other implementations of the
//! `primaryLocationLineHash` algorithm.

use std::collections::{HashMap, VecDeque};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use crate::errors::FingerprintError;

/// Number of normalized characters summarized by one line hash.
pub const BLOCK_SIZE: usize = 100;

const BASE: u64 = 37;
const TAB: u16 = b'\t' as u16;
const SPACE: u16 = b' ' as u16;
const LF: u16 = b'\n' as u16;
const CR: u16 = b'\r' as u16;
/// Appended once after the last real character; outside any text value.
const EOF_MARKER: u16 = 0xFFFF;
const REPLACEMENT: u16 = 0xFFFD;
const READ_CHUNK: usize = 64 * 1024;

/// Fingerprint of one physical line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineHash {
    /// 1-based line number.
    pub line: usize,
    /// `<hex-hash>:<occurrence>` token.
    pub token: String,
}

/// Per-file counter turning raw hashes into unique tokens.
///
/// Identical local contexts within a file get `:1`, `:2`, ... in order of
/// appearance.
#[derive(Debug, Default)]
pub struct HashOccurrences {
    counts: HashMap<String, usize>,
}

impl HashOccurrences {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one more sighting of `raw_hex` and return its token.
    pub fn disambiguate(&mut self, raw_hex: &str) -> String {
        let count = self.counts.entry(raw_hex.to_string()).or_insert(0);
        *count += 1;
        format!("{raw_hex}:{count}")
    }
}

/// Incremental line hasher over a stream of UTF-16 code units.
///
/// Feed every code unit with [`push`](Self::push), then call
/// [`flush_step`](Self::flush_step) `BLOCK_SIZE` times after the end-of-file
/// marker. Each step yields at most one finished line.
#[derive(Debug)]
pub struct RollingHasher {
    window: [u16; BLOCK_SIZE],
    /// Line started by the character in the matching window slot.
    line_marks: [Option<usize>; BLOCK_SIZE],
    hash: u64,
    /// BASE^BLOCK_SIZE, weight of the character leaving the window.
    outgoing_weight: u64,
    index: usize,
    line_number: usize,
    line_start: bool,
    prev_cr: bool,
    occurrences: HashOccurrences,
}

impl Default for RollingHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl RollingHasher {
    pub fn new() -> Self {
        let outgoing_weight = (0..BLOCK_SIZE).fold(1u64, |acc, _| acc.wrapping_mul(BASE));
        Self {
            window: [0; BLOCK_SIZE],
            line_marks: [None; BLOCK_SIZE],
            hash: 0,
            outgoing_weight,
            index: 0,
            line_number: 0,
            line_start: true,
            prev_cr: false,
            occurrences: HashOccurrences::new(),
        }
    }

    /// Process one input code unit.
    pub fn push(&mut self, unit: u16) -> Option<LineHash> {
        // Blanks never enter the window; neither does the LF of a CRLF pair.
        if unit == SPACE || unit == TAB || (self.prev_cr && unit == LF) {
            self.prev_cr = false;
            return None;
        }
        let current = if unit == CR {
            self.prev_cr = true;
            LF
        } else {
            self.prev_cr = false;
            unit
        };

        let finished = self.take_finished_line();
        if self.line_start {
            self.line_start = false;
            self.line_number += 1;
            self.line_marks[self.index] = Some(self.line_number);
        }
        if current == LF {
            self.line_start = true;
        }
        self.roll(current);
        finished
    }

    /// Push the end-of-file marker.
    pub fn finish_input(&mut self) -> Option<LineHash> {
        self.push(EOF_MARKER)
    }

    /// Drain one slot of the window with a zero character.
    pub fn flush_step(&mut self) -> Option<LineHash> {
        let finished = self.take_finished_line();
        self.roll(0);
        finished
    }

    fn take_finished_line(&mut self) -> Option<LineHash> {
        let line = self.line_marks[self.index].take()?;
        let raw_hex = format!("{:x}", self.hash);
        Some(LineHash {
            line,
            token: self.occurrences.disambiguate(&raw_hex),
        })
    }

    fn roll(&mut self, incoming: u16) {
        let outgoing = self.window[self.index];
        self.window[self.index] = incoming;
        self.hash = self
            .hash
            .wrapping_mul(BASE)
            .wrapping_add(u64::from(incoming))
            .wrapping_sub(self.outgoing_weight.wrapping_mul(u64::from(outgoing)));
        self.index = (self.index + 1) % BLOCK_SIZE;
    }
}

/// Streaming UTF-8 to UTF-16 decoder with lossy replacement.
///
/// Multi-byte sequences split across read chunks are carried over; invalid
/// sequences become U+FFFD, one per maximal invalid subpart.
struct Utf16Units<R> {
    reader: R,
    chunk: Vec<u8>,
    pending: Vec<u8>,
    units: VecDeque<u16>,
    eof: bool,
}

impl<R: Read> Utf16Units<R> {
    fn new(reader: R) -> Self {
        Self {
            reader,
            chunk: vec![0; READ_CHUNK],
            pending: Vec::new(),
            units: VecDeque::new(),
            eof: false,
        }
    }

    fn next_unit(&mut self) -> io::Result<Option<u16>> {
        loop {
            if let Some(unit) = self.units.pop_front() {
                return Ok(Some(unit));
            }
            if self.eof {
                return Ok(None);
            }
            self.fill()?;
        }
    }

    fn fill(&mut self) -> io::Result<()> {
        let read = loop {
            match self.reader.read(&mut self.chunk) {
                Ok(n) => break n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        };

        if read == 0 {
            self.eof = true;
            if !self.pending.is_empty() {
                // Truncated sequence at end of file
                self.units.push_back(REPLACEMENT);
                self.pending.clear();
            }
            return Ok(());
        }

        self.pending.extend_from_slice(&self.chunk[..read]);
        self.decode_pending();
        Ok(())
    }

    fn decode_pending(&mut self) {
        let mut consumed = 0;
        while consumed < self.pending.len() {
            match std::str::from_utf8(&self.pending[consumed..]) {
                Ok(text) => {
                    self.units.extend(text.encode_utf16());
                    consumed = self.pending.len();
                }
                Err(err) => {
                    let valid_end = consumed + err.valid_up_to();
                    if let Ok(text) = std::str::from_utf8(&self.pending[consumed..valid_end]) {
                        self.units.extend(text.encode_utf16());
                    }
                    match err.error_len() {
                        Some(len) => {
                            self.units.push_back(REPLACEMENT);
                            consumed = valid_end + len;
                        }
                        None => {
                            // Incomplete sequence; wait for the next chunk
                            consumed = valid_end;
                            break;
                        }
                    }
                }
            }
        }
        self.pending.drain(..consumed);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Input,
    Flush(usize),
    Done,
}

/// Lazy sequence of line hashes for one input stream.
///
/// One-shot: yields every line of the stream once, in line order, then
/// `None`. A read error is yielded once and ends the sequence.
pub struct LineHashes<R> {
    units: Utf16Units<R>,
    hasher: RollingHasher,
    phase: Phase,
}

impl<R: Read> LineHashes<R> {
    pub fn new(reader: R) -> Self {
        Self {
            units: Utf16Units::new(reader),
            hasher: RollingHasher::new(),
            phase: Phase::Input,
        }
    }
}

impl<R: Read> Iterator for LineHashes<R> {
    type Item = io::Result<LineHash>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let emitted = match self.phase {
                Phase::Input => match self.units.next_unit() {
                    Ok(Some(unit)) => self.hasher.push(unit),
                    Ok(None) => {
                        self.phase = Phase::Flush(0);
                        self.hasher.finish_input()
                    }
                    Err(e) => {
                        self.phase = Phase::Done;
                        return Some(Err(e));
                    }
                },
                Phase::Flush(step) if step < BLOCK_SIZE => {
                    self.phase = Phase::Flush(step + 1);
                    self.hasher.flush_step()
                }
                Phase::Flush(_) => {
                    self.phase = Phase::Done;
                    None
                }
                Phase::Done => return None,
            };
            if let Some(line_hash) = emitted {
                return Some(Ok(line_hash));
            }
        }
    }
}

/// Hash every line of `reader`, calling `on_line_hash(line, token)` in order.
pub fn hash_reader<R, F>(reader: R, mut on_line_hash: F) -> io::Result<()>
where
    R: Read,
    F: FnMut(usize, &str),
{
    for line_hash in LineHashes::new(reader) {
        let line_hash = line_hash?;
        on_line_hash(line_hash.line, &line_hash.token);
    }
    Ok(())
}

/// Hash every line of the file at `path`.
///
/// Fails only when the file cannot be opened or read; any content is valid.
pub fn hash<F>(path: &Path, on_line_hash: F) -> Result<(), FingerprintError>
where
    F: FnMut(usize, &str),
{
    let file = File::open(path).map_err(|e| FingerprintError::io(path, e))?;
    hash_reader(file, on_line_hash).map_err(|e| FingerprintError::io(path, e))
}

/// Hash in-memory text.
pub fn hash_str(input: &str) -> Vec<LineHash> {
    let mut hasher = RollingHasher::new();
    let mut hashes: Vec<LineHash> = input
        .encode_utf16()
        .filter_map(|unit| hasher.push(unit))
        .collect();
    hashes.extend(hasher.finish_input());
    hashes.extend((0..BLOCK_SIZE).filter_map(|_| hasher.flush_step()));
    hashes
}
