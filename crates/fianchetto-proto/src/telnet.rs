//! Telnet byte-stream codec.
//!
//! The server speaks classic telnet: the byte `255` (IAC) escapes option
//! negotiation, `IAC IAC` encodes a literal `255`, and line endings arrive
//! swapped relative to what the text layer expects. [`TelnetCodec`] is
//! sans-IO: feed it raw socket bytes, it appends decoded text and the
//! negotiation replies to write back. State split across reads (an IAC, or
//! an IAC plus verb, as the final bytes of a chunk) is held and resumed on
//! the next call rather than dropped.
//!
//! Negotiation policy: mirror `DO SUPPRESS-GO-AHEAD` with `WILL`, decline
//! everything else (`DO x` → `WONT x`, `WILL x` → `DONT x`). `WONT`/`DONT`
//! need no answer.

/// Interpret-As-Command escape sentinel.
pub const IAC: u8 = 255;

/// Negotiation verb: peer offers to enable an option on its side.
pub const WILL: u8 = 251;

/// Negotiation verb: peer refuses an option on its side.
pub const WONT: u8 = 252;

/// Negotiation verb: peer requests we enable an option.
pub const DO: u8 = 253;

/// Negotiation verb: peer rejects an option on our side.
pub const DONT: u8 = 254;

/// The one option we accept: suppress go-ahead.
pub const SUPPRESS_GO_AHEAD: u8 = 3;

/// Escape state carried between reads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum Held {
    /// Not inside an escape sequence.
    #[default]
    None,
    /// An IAC was the last byte of the previous read.
    Iac,
    /// An IAC plus this negotiation verb ended the previous read.
    Verb(u8),
}

/// Output of one [`TelnetCodec::decode`] call.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Decoded {
    /// Decoded text with line endings normalized (CR and LF swapped).
    pub text: String,
    /// Negotiation replies to write back to the peer.
    pub replies: Vec<u8>,
}

/// Incremental telnet decoder for one connection.
#[derive(Debug, Default)]
pub struct TelnetCodec {
    held: Held,
}

impl TelnetCodec {
    /// Create a codec with no held escape state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode one chunk of raw socket bytes.
    ///
    /// CR and LF are swapped before text is appended; the server terminates
    /// lines with LF CR, so the swap yields CR LF and downstream splitting
    /// on `\n` keeps working. The swap must stay exact — see the line
    /// extraction in the client's dispatch buffer.
    pub fn decode(&mut self, input: &[u8]) -> Decoded {
        let mut out = Decoded::default();

        for &byte in input {
            match self.held {
                Held::None => match byte {
                    IAC => self.held = Held::Iac,
                    b'\r' => out.text.push('\n'),
                    b'\n' => out.text.push('\r'),
                    _ => out.text.push(char::from(byte)),
                },
                Held::Iac => match byte {
                    // IAC IAC is a literal 255 in the text stream.
                    IAC => {
                        out.text.push(char::from(IAC));
                        self.held = Held::None;
                    },
                    WILL | WONT | DO | DONT => self.held = Held::Verb(byte),
                    // Other telnet commands (GA, NOP, ...) carry no option
                    // byte and nothing we act on.
                    _ => self.held = Held::None,
                },
                Held::Verb(verb) => {
                    match (verb, byte) {
                        (DO, SUPPRESS_GO_AHEAD) => {
                            out.replies.extend_from_slice(&[IAC, WILL, SUPPRESS_GO_AHEAD]);
                        },
                        (DO, option) => out.replies.extend_from_slice(&[IAC, WONT, option]),
                        (WILL, option) => out.replies.extend_from_slice(&[IAC, DONT, option]),
                        // WONT/DONT acknowledge our refusals; no reply.
                        _ => {},
                    }
                    self.held = Held::None;
                },
            }
        }

        out
    }
}
