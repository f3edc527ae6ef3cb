use log::{debug, error, info, warn};
use std::io::{BufRead, BufReader, ErrorKind, Read};
use std::time::{Duration, Instant};

use super::decoder::TelegramDecoder;
use super::structs::{MeterReading, RawTelegram};
use super::P1Error;

/// Lines up to this many bytes are noise as far as stall detection goes.
pub const SUBSTANTIVE_LINE_LEN: usize = 5;
pub const END_MARKER: u8 = b'!';
/// Telegram text beyond this without an end marker is dropped.
pub const MAX_TELEGRAM_LEN: usize = 8192;
/// Bytes without a line end beyond this are dropped as noise.
pub const MAX_LINE_LEN: usize = 2048;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    AwaitingData,
    Accumulating,
    /// No substantive line within the data timeout, terminal.
    Stalled,
    /// The connection failed or was closed, terminal.
    Closed,
}

/// Assembles telegrams from a line oriented byte stream.
///
/// The reader owns its connection. Once it hits a stall or an I/O error the
/// connection is dropped and the reader stays in a terminal state, a new
/// reader has to be created to continue.
pub struct TelegramReader<C: Read> {
    connection: Option<BufReader<C>>,
    decoder: TelegramDecoder,
    data_timeout: Duration,
    state: ReaderState,
    telegram: Vec<u8>,
    partial_line: Vec<u8>,
    last_data: Instant,
}

impl<C: Read> TelegramReader<C> {
    pub fn new(connection: C, decoder: TelegramDecoder, data_timeout: Duration) -> Self {
        Self {
            connection: Some(BufReader::new(connection)),
            decoder,
            data_timeout,
            state: ReaderState::AwaitingData,
            telegram: Vec::new(),
            partial_line: Vec::new(),
            last_data: Instant::now(),
        }
    }

    pub fn state(&self) -> ReaderState {
        self.state
    }

    /// Blocks until the next complete telegram has been read.
    ///
    /// `P1Error::Decode` only concerns the telegram at hand, every other
    /// error closes the connection.
    pub fn read_telegram(&mut self) -> Result<(MeterReading, RawTelegram), P1Error> {
        loop {
            let line = match self.read_line() {
                Ok(line) => line,
                Err(e) => {
                    error!("Reading from the meter failed: {}", e);
                    self.close(ReaderState::Closed);
                    return Err(e);
                }
            };

            let telegram_end = match line {
                Some(line) => self.push_line(&line),
                None => false,
            };

            let elapsed = self.last_data.elapsed();
            if elapsed > self.data_timeout {
                error!("No data received from the meter for {:?}", elapsed);
                self.close(ReaderState::Stalled);
                return Err(P1Error::NoData { elapsed, timeout: self.data_timeout });
            }

            if telegram_end {
                let raw = std::mem::take(&mut self.telegram);
                self.state = ReaderState::AwaitingData;
                debug!("Telegram complete with {} bytes", raw.len());

                return self.decoder.decode_bytes(raw).inspect_err(|e| {
                    warn!("Dropping telegram: {}", e);
                });
            }
        }
    }

    /// Adds a line to the telegram in progress, true when it ends the telegram.
    fn push_line(&mut self, line: &[u8]) -> bool {
        if line.len() > SUBSTANTIVE_LINE_LEN {
            self.last_data = Instant::now();
        }

        let line = line.trim_ascii();
        debug!("P1 line: {}", String::from_utf8_lossy(line));
        if self.telegram.len() + line.len() >= MAX_TELEGRAM_LEN {
            warn!("No end of telegram within {} bytes, dropping what was read", MAX_TELEGRAM_LEN);
            self.telegram.clear();
        }
        self.telegram.extend_from_slice(line);
        self.telegram.push(b'\n');
        self.state = ReaderState::Accumulating;

        line.first() == Some(&END_MARKER)
    }

    /// One line including its terminator, or `None` when the read timed out
    /// before a line was complete. Partial data is kept for the next call
    /// unless it grows past `MAX_LINE_LEN`.
    fn read_line(&mut self) -> Result<Option<Vec<u8>>, P1Error> {
        let connection = self.connection.as_mut().ok_or(P1Error::ConnectionClosed)?;

        loop {
            let available = match connection.fill_buf() {
                Ok(available) => available,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => return Ok(None),
                Err(e) => return Err(e.into()),
            };
            if available.is_empty() {
                return Err(P1Error::ConnectionClosed);
            }

            let (used, line_end) = match available.iter().position(|&b| b == b'\n') {
                Some(pos) => (pos + 1, true),
                None => (available.len(), false),
            };
            self.partial_line.extend_from_slice(&available[..used]);
            connection.consume(used);

            if line_end {
                return Ok(Some(std::mem::take(&mut self.partial_line)));
            }
            if self.partial_line.len() > MAX_LINE_LEN {
                warn!("Dropping {} bytes without a line end", self.partial_line.len());
                self.partial_line.clear();
                return Ok(None);
            }
        }
    }

    fn close(&mut self, state: ReaderState) {
        if self.connection.take().is_some() {
            info!("Closing meter connection");
        }
        self.telegram.clear();
        self.partial_line.clear();
        self.state = state;
    }
}

/// Endless sequence of telegrams, ends after the first fatal error.
impl<C: Read> Iterator for TelegramReader<C> {
    type Item = Result<(MeterReading, RawTelegram), P1Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.connection.as_ref()?;
        Some(self.read_telegram())
    }
}
