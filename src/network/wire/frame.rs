use std::{fmt, str::FromStr};

use bytes::{BufMut, Bytes, BytesMut};
use zumq_error::ProtocolError;

use crate::Outcome;

/// Окончание строки кадра при записи. При чтении принимается и `\n`.
pub const LINE_ENDING: &[u8] = b"\r\n";

/// Роль линка с точки зрения клиента.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkRole {
    /// Клиент публикует сообщения; на брокере это входящий линк.
    Sender,
    /// Клиент получает сообщения; на брокере это исходящий линк.
    Receiver,
}

/// Кадр построчного протокола.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Attach {
        handle: u32,
        role: LinkRole,
        address: String,
    },
    Attached {
        handle: u32,
    },
    Flow {
        handle: u32,
        credit: u32,
    },
    /// Полезная нагрузка занимает остаток строки и не может содержать
    /// перевод строки.
    Transfer {
        handle: u32,
        delivery_id: u64,
        payload: Bytes,
    },
    Disposition {
        handle: u32,
        delivery_id: u64,
        outcome: Outcome,
    },
    Detach {
        handle: u32,
        reason: Option<String>,
    },
    Error {
        text: String,
    },
}

/// Курсор по полям строки кадра.
struct Fields<'a> {
    command: &'static str,
    rest: &'a [u8],
}

////////////////////////////////////////////////////////////////////////////////
// Собственные методы
////////////////////////////////////////////////////////////////////////////////

impl Frame {
    /// Разбирает одну строку (с окончанием строки или без).
    pub fn parse(line: &[u8]) -> Result<Frame, ProtocolError> {
        let line = trim_line_ending(line);
        let (name, rest) = split_token(line);
        if name.is_empty() {
            return Err(ProtocolError::EmptyFrame);
        }

        let name = std::str::from_utf8(name)
            .map_err(|_| ProtocolError::UnknownCommand(String::from_utf8_lossy(name).into_owned()))?;
        let command = command_name(name)
            .ok_or_else(|| ProtocolError::UnknownCommand(name.to_string()))?;
        let mut fields = Fields { command, rest };

        let frame = match command {
            "ATTACH" => {
                let handle = fields.integer("handle")?;
                let role = fields.token("role")?;
                let role = role.parse().map_err(|_| ProtocolError::InvalidValue {
                    command,
                    field: "role",
                    value: role.to_string(),
                })?;
                let address = fields.token("address")?.to_string();
                Frame::Attach {
                    handle,
                    role,
                    address,
                }
            }
            "ATTACHED" => Frame::Attached {
                handle: fields.integer("handle")?,
            },
            "FLOW" => Frame::Flow {
                handle: fields.integer("handle")?,
                credit: fields.integer("credit")?,
            },
            "TRANSFER" => Frame::Transfer {
                handle: fields.integer("handle")?,
                delivery_id: fields.integer("delivery-id")?,
                payload: Bytes::copy_from_slice(fields.rest()),
            },
            "DISPOSITION" => {
                let handle = fields.integer("handle")?;
                let delivery_id = fields.integer("delivery-id")?;
                let outcome = fields.token("outcome")?;
                let outcome = outcome.parse().map_err(|_| ProtocolError::InvalidValue {
                    command,
                    field: "outcome",
                    value: outcome.to_string(),
                })?;
                Frame::Disposition {
                    handle,
                    delivery_id,
                    outcome,
                }
            }
            "DETACH" => {
                let handle = fields.integer("handle")?;
                let reason = fields.rest();
                Frame::Detach {
                    handle,
                    reason: (!reason.is_empty())
                        .then(|| String::from_utf8_lossy(reason).into_owned()),
                }
            }
            _ => Frame::Error {
                text: String::from_utf8_lossy(fields.rest()).into_owned(),
            },
        };

        Ok(frame)
    }

    /// Дописывает кадр вместе с окончанием строки в `dst`.
    pub fn encode(
        &self,
        dst: &mut BytesMut,
    ) {
        match self {
            Frame::Attach {
                handle,
                role,
                address,
            } => put_line(dst, format_args!("ATTACH {handle} {role} {address}")),
            Frame::Attached { handle } => put_line(dst, format_args!("ATTACHED {handle}")),
            Frame::Flow { handle, credit } => put_line(dst, format_args!("FLOW {handle} {credit}")),
            Frame::Transfer {
                handle,
                delivery_id,
                payload,
            } => {
                let header = format!("TRANSFER {handle} {delivery_id} ");
                dst.reserve(header.len() + payload.len() + LINE_ENDING.len());
                dst.put_slice(header.as_bytes());
                dst.put_slice(payload);
                dst.put_slice(LINE_ENDING);
            }
            Frame::Disposition {
                handle,
                delivery_id,
                outcome,
            } => put_line(
                dst,
                format_args!("DISPOSITION {handle} {delivery_id} {outcome}"),
            ),
            Frame::Detach {
                handle,
                reason: Some(reason),
            } => put_line(dst, format_args!("DETACH {handle} {reason}")),
            Frame::Detach {
                handle,
                reason: None,
            } => put_line(dst, format_args!("DETACH {handle}")),
            Frame::Error { text } => put_line(dst, format_args!("ERROR {text}")),
        }
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        buf.freeze()
    }

    /// Имя команды кадра.
    pub fn name(&self) -> &'static str {
        match self {
            Frame::Attach { .. } => "ATTACH",
            Frame::Attached { .. } => "ATTACHED",
            Frame::Flow { .. } => "FLOW",
            Frame::Transfer { .. } => "TRANSFER",
            Frame::Disposition { .. } => "DISPOSITION",
            Frame::Detach { .. } => "DETACH",
            Frame::Error { .. } => "ERROR",
        }
    }
}

impl<'a> Fields<'a> {
    fn token(
        &mut self,
        field: &'static str,
    ) -> Result<&'a str, ProtocolError> {
        let (token, rest) = split_token(self.rest);
        self.rest = rest;
        if token.is_empty() {
            return Err(ProtocolError::MissingField {
                command: self.command,
                field,
            });
        }
        std::str::from_utf8(token).map_err(|_| ProtocolError::InvalidValue {
            command: self.command,
            field,
            value: String::from_utf8_lossy(token).into_owned(),
        })
    }

    fn integer<T: FromStr>(
        &mut self,
        field: &'static str,
    ) -> Result<T, ProtocolError> {
        let token = self.token(field)?;
        token.parse().map_err(|_| ProtocolError::InvalidInteger {
            command: self.command,
            field,
            value: token.to_string(),
        })
    }

    /// Остаток строки как есть.
    fn rest(&mut self) -> &'a [u8] {
        std::mem::take(&mut self.rest)
    }
}

impl LinkRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkRole::Sender => "sender",
            LinkRole::Receiver => "receiver",
        }
    }
}

////////////////////////////////////////////////////////////////////////////////
// Общие реализации трейтов
////////////////////////////////////////////////////////////////////////////////

impl FromStr for LinkRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("sender") {
            Ok(LinkRole::Sender)
        } else if s.eq_ignore_ascii_case("receiver") {
            Ok(LinkRole::Receiver)
        } else {
            Err(format!("unknown link role '{s}'"))
        }
    }
}

impl fmt::Display for LinkRole {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

////////////////////////////////////////////////////////////////////////////////
// Внутренние функции
////////////////////////////////////////////////////////////////////////////////

fn command_name(name: &str) -> Option<&'static str> {
    [
        "ATTACH",
        "ATTACHED",
        "FLOW",
        "TRANSFER",
        "DISPOSITION",
        "DETACH",
        "ERROR",
    ]
    .into_iter()
    .find(|c| c.eq_ignore_ascii_case(name))
}

fn trim_line_ending(mut line: &[u8]) -> &[u8] {
    if let Some(stripped) = line.strip_suffix(b"\n") {
        line = stripped;
    }
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Отделяет первое слово; остаток идёт без одного разделяющего пробела.
fn split_token(line: &[u8]) -> (&[u8], &[u8]) {
    match line.iter().position(|b| *b == b' ') {
        Some(pos) => (&line[..pos], &line[pos + 1..]),
        None => (line, &line[line.len()..]),
    }
}

fn put_line(
    dst: &mut BytesMut,
    args: fmt::Arguments<'_>,
) {
    dst.put_slice(args.to_string().as_bytes());
    dst.put_slice(LINE_ENDING);
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Тест проверяет разбор ATTACH с обеими ролями.
    #[test]
    fn test_parse_attach() {
        assert_eq!(
            Frame::parse(b"ATTACH 1 sender orders\r\n").unwrap(),
            Frame::Attach {
                handle: 1,
                role: LinkRole::Sender,
                address: "orders".into()
            }
        );
        assert_eq!(
            Frame::parse(b"attach 7 RECEIVER jobs\n").unwrap(),
            Frame::Attach {
                handle: 7,
                role: LinkRole::Receiver,
                address: "jobs".into()
            }
        );
    }

    /// Тест проверяет, что полезная нагрузка TRANSFER берётся целиком,
    /// включая пробелы, и может быть пустой.
    #[test]
    fn test_parse_transfer_payload_is_rest_of_line() {
        assert_eq!(
            Frame::parse(b"TRANSFER 2 10 hello  world \r\n").unwrap(),
            Frame::Transfer {
                handle: 2,
                delivery_id: 10,
                payload: Bytes::from_static(b"hello  world ")
            }
        );
        assert_eq!(
            Frame::parse(b"TRANSFER 2 11\r\n").unwrap(),
            Frame::Transfer {
                handle: 2,
                delivery_id: 11,
                payload: Bytes::new()
            }
        );
    }

    #[test]
    fn test_parse_disposition_and_detach() {
        assert_eq!(
            Frame::parse(b"DISPOSITION 3 4 released").unwrap(),
            Frame::Disposition {
                handle: 3,
                delivery_id: 4,
                outcome: Outcome::Released
            }
        );
        assert_eq!(
            Frame::parse(b"DETACH 3 no queue for address").unwrap(),
            Frame::Detach {
                handle: 3,
                reason: Some("no queue for address".into())
            }
        );
        assert_eq!(
            Frame::parse(b"DETACH 3").unwrap(),
            Frame::Detach {
                handle: 3,
                reason: None
            }
        );
    }

    /// Тест проверяет ошибки разбора.
    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            Frame::parse(b"\r\n"),
            Err(ProtocolError::EmptyFrame)
        ));
        assert!(matches!(
            Frame::parse(b"PUBLISH 1"),
            Err(ProtocolError::UnknownCommand(c)) if c == "PUBLISH"
        ));
        assert!(matches!(
            Frame::parse(b"FLOW 1"),
            Err(ProtocolError::MissingField {
                command: "FLOW",
                field: "credit"
            })
        ));
        assert!(matches!(
            Frame::parse(b"FLOW x 1"),
            Err(ProtocolError::InvalidInteger { field: "handle", .. })
        ));
        assert!(matches!(
            Frame::parse(b"DISPOSITION 1 1 maybe"),
            Err(ProtocolError::InvalidValue { field: "outcome", .. })
        ));
        assert!(matches!(
            Frame::parse(b"ATTACH 1 observer q"),
            Err(ProtocolError::InvalidValue { field: "role", .. })
        ));
    }

    /// Тест проверяет, что закодированный кадр разбирается обратно.
    #[test]
    fn test_encode_then_parse() {
        let frames = [
            Frame::Attach {
                handle: 0,
                role: LinkRole::Receiver,
                address: "q".into(),
            },
            Frame::Flow {
                handle: 0,
                credit: 100,
            },
            Frame::Transfer {
                handle: 0,
                delivery_id: 1,
                payload: Bytes::from_static(b"a b c"),
            },
            Frame::Detach {
                handle: 0,
                reason: Some("bye".into()),
            },
            Frame::Error {
                text: "unknown link handle 9".into(),
            },
        ];
        for frame in frames {
            let bytes = frame.to_bytes();
            assert!(bytes.ends_with(LINE_ENDING));
            assert_eq!(Frame::parse(&bytes).unwrap(), frame);
        }
    }
}
