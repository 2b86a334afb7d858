use super::*;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const IAC: u8 = 255;
const DONT: u8 = 254;
const DO: u8 = 253;
const WONT: u8 = 252;
const WILL: u8 = 251;
const SB: u8 = 250;
const SE: u8 = 240;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum IacState {
    #[default]
    Data,
    Iac,
    Option(u8),
    Subnegotiation,
    SubnegotiationIac,
}

/// Telnet command stripper.
///
/// Every option the server offers or requests is refused: `WILL` and
/// `DO` are answered with `DONT` and `WONT`. Subnegotiations are dropped.
#[derive(Debug, Default)]
pub(crate) struct IacParser {
    state: IacState,
}

impl IacParser {
    /// Splits `input` into terminal data and negotiation replies.
    ///
    /// State carries over between calls, so a command split across two
    /// reads is still recognised.
    pub(crate) fn feed(&mut self, input: &[u8], data: &mut Vec<u8>, replies: &mut Vec<u8>) {
        for &byte in input {
            self.state = match (self.state, byte) {
                (IacState::Data, IAC) => IacState::Iac,
                (IacState::Data, b) => {
                    data.push(b);
                    IacState::Data
                }
                (IacState::Iac, IAC) => {
                    data.push(IAC);
                    IacState::Data
                }
                (IacState::Iac, WILL | WONT | DO | DONT) => IacState::Option(byte),
                (IacState::Iac, SB) => IacState::Subnegotiation,
                (IacState::Iac, _) => IacState::Data,
                (IacState::Option(verb), option) => {
                    match verb {
                        WILL => replies.extend_from_slice(&[IAC, DONT, option]),
                        DO => replies.extend_from_slice(&[IAC, WONT, option]),
                        _ => {}
                    }
                    IacState::Data
                }
                (IacState::Subnegotiation, IAC) => IacState::SubnegotiationIac,
                (IacState::Subnegotiation, _) => IacState::Subnegotiation,
                (IacState::SubnegotiationIac, SE) => IacState::Data,
                (IacState::SubnegotiationIac, _) => IacState::Subnegotiation,
            };
        }
    }
}

/// Decodes terminal data to text, holding back a multibyte character
/// that is cut off at the end of a read until the rest arrives.
#[derive(Debug, Default)]
pub(crate) struct Utf8Decoder {
    partial: Vec<u8>,
}

impl Utf8Decoder {
    pub(crate) fn decode(&mut self, data: &[u8]) -> String {
        let mut bytes = std::mem::take(&mut self.partial);
        bytes.extend_from_slice(data);
        let keep = incomplete_tail(&bytes);
        self.partial = bytes.split_off(bytes.len() - keep);
        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// Whatever is still held back, decoded as is.
    pub(crate) fn flush(&mut self) -> Option<String> {
        if self.partial.is_empty() {
            return None;
        }
        let bytes = std::mem::take(&mut self.partial);
        Some(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Length of an unfinished UTF-8 sequence at the end of `bytes`.
fn incomplete_tail(bytes: &[u8]) -> usize {
    for back in 1..=bytes.len().min(3) {
        let byte = bytes[bytes.len() - back];
        if byte & 0xC0 == 0x80 {
            continue;
        }
        let needed = match byte {
            0xF0..=0xF7 => 4,
            0xE0..=0xEF => 3,
            0xC0..=0xDF => 2,
            _ => 1,
        };
        return if needed > back { back } else { 0 };
    }
    0
}

/// Plain telnet byte stream to the device's management terminal.
pub struct TelnetTransport {
    stream: TcpStream,
    parser: IacParser,
    decoder: Utf8Decoder,
    addr: String,
}

impl TelnetTransport {
    pub async fn connect(host: &str, port: u16, timeout: Duration) -> Result<Self, VerifyError> {
        let addr = format!("{host}:{port}");
        let stream = match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(err)) => {
                return Err(VerifyError::ConnectFailed {
                    addr,
                    reason: err.to_string(),
                });
            }
            Err(_) => {
                return Err(VerifyError::ConnectFailed {
                    addr,
                    reason: format!("no answer within {}s", timeout.as_secs()),
                });
            }
        };
        debug!("{} telnet connection successful", addr);
        Ok(Self {
            stream,
            parser: IacParser::default(),
            decoder: Utf8Decoder::default(),
            addr,
        })
    }
}

#[async_trait]
impl CliTransport for TelnetTransport {
    async fn send(&mut self, data: &str) -> Result<(), VerifyError> {
        self.stream.write_all(data.as_bytes()).await?;
        Ok(())
    }

    async fn read_chunk(&mut self) -> Result<Option<String>, VerifyError> {
        let mut buf = [0u8; 4096];
        loop {
            let n = self.stream.read(&mut buf).await?;
            if n == 0 {
                debug!("{} telnet peer closed the connection", self.addr);
                return Ok(self.decoder.flush());
            }
            let mut data = Vec::with_capacity(n);
            let mut replies = Vec::new();
            self.parser.feed(&buf[..n], &mut data, &mut replies);
            if !replies.is_empty() {
                trace!("{} refusing telnet options: {:?}", self.addr, replies);
                self.stream.write_all(&replies).await?;
            }
            let text = self.decoder.decode(&data);
            if !text.is_empty() {
                return Ok(Some(text));
            }
        }
    }

    async fn close(&mut self) -> Result<(), VerifyError> {
        self.stream.shutdown().await?;
        debug!("{} telnet connection closed", self.addr);
        Ok(())
    }
}
