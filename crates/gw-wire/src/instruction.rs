use crate::field::{render_length_prefixed, FieldValue};

/// An instruction received from a user: an opcode plus its argument
/// fields, already decoded from the wire's length-prefixed form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    opcode: String,
    args: Vec<String>,
}

impl Instruction {
    #[must_use]
    pub fn opcode(&self) -> &str {
        &self.opcode
    }

    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Parse one instruction from the start of `input`.
    ///
    /// Returns the parsed instruction and the number of bytes consumed
    /// (including the trailing `;`). Returns [`ParseError::Incomplete`]
    /// if `input` does not yet contain a full instruction — the caller
    /// should read more bytes and retry, as is typical when reading from
    /// a streaming socket.
    pub fn parse_one(input: &str) -> Result<(Instruction, usize), ParseError> {
        let bytes = input.as_bytes();
        let mut pos = 0usize;
        let mut fields = Vec::new();

        loop {
            let start = pos;
            while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                pos += 1;
            }
            if pos == start {
                if pos >= bytes.len() {
                    return Err(ParseError::Incomplete);
                }
                return Err(ParseError::Malformed("missing field length prefix".into()));
            }

            let count: usize = input[start..pos]
                .parse()
                .map_err(|_| ParseError::Malformed("field length is not a valid integer".into()))?;

            if pos >= bytes.len() {
                return Err(ParseError::Incomplete);
            }
            if bytes[pos] != b'.' {
                return Err(ParseError::Malformed("expected '.' after field length".into()));
            }
            pos += 1;

            let rest = &input[pos..];
            let mut char_indices = rest.char_indices();
            for _ in 0..count {
                if char_indices.next().is_none() {
                    return Err(ParseError::Incomplete);
                }
            }
            let end_byte = char_indices.next().map_or(rest.len(), |(idx, _)| idx);

            fields.push(rest[..end_byte].to_string());
            pos += end_byte;

            if pos >= bytes.len() {
                return Err(ParseError::Incomplete);
            }

            match bytes[pos] {
                b',' => {
                    pos += 1;
                }
                b';' => {
                    pos += 1;
                    break;
                }
                _ => return Err(ParseError::Malformed("expected ',' or ';' after field".into())),
            }
        }

        if fields.is_empty() {
            return Err(ParseError::Malformed("instruction has no opcode".into()));
        }

        let opcode = fields.remove(0);
        Ok((Instruction { opcode, args: fields }, pos))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("malformed instruction: {0}")]
    Malformed(String),
    #[error("instruction incomplete, more data needed")]
    Incomplete,
}

/// Builder for a single outgoing instruction.
///
/// ```
/// use gw_wire::{InstructionBuilder, FieldValue};
/// let rendered = InstructionBuilder::new("size")
///     .int(0)
///     .int(1024)
///     .int(768)
///     .build();
/// assert_eq!(rendered, "4.size,1.0,4.1024,3.768;");
/// ```
pub struct InstructionBuilder {
    fields: Vec<String>,
}

impl InstructionBuilder {
    #[must_use]
    pub fn new(opcode: &str) -> Self {
        Self { fields: vec![render_length_prefixed(opcode)] }
    }

    #[must_use]
    pub fn arg(mut self, value: FieldValue<'_>) -> Self {
        self.fields.push(value.render());
        self
    }

    #[must_use]
    pub fn int(self, v: i64) -> Self {
        self.arg(FieldValue::Int(v))
    }

    #[must_use]
    pub fn double(self, v: f64) -> Self {
        self.arg(FieldValue::Double(v))
    }

    #[must_use]
    pub fn str(self, v: &str) -> Self {
        self.arg(FieldValue::Str(v))
    }

    #[must_use]
    pub fn blob(self, v: &[u8]) -> Self {
        self.arg(FieldValue::Blob(v))
    }

    #[must_use]
    pub fn build(self) -> String {
        format!("{};", self.fields.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_simple_instruction() {
        let rendered = InstructionBuilder::new("sync").int(12345).build();
        let (parsed, consumed) = Instruction::parse_one(&rendered).unwrap();
        assert_eq!(consumed, rendered.len());
        assert_eq!(parsed.opcode(), "sync");
        assert_eq!(parsed.args(), &["12345".to_string()]);
    }

    #[test]
    fn parses_unicode_payload_by_codepoint_count() {
        let rendered = InstructionBuilder::new("msg").str("héllo").build();
        assert_eq!(rendered, "3.msg,5.héllo;");
        let (parsed, _) = Instruction::parse_one(&rendered).unwrap();
        assert_eq!(parsed.args(), &["héllo".to_string()]);
    }

    #[test]
    fn incomplete_instruction_is_reported() {
        let partial = "4.size,1.0,4.10";
        assert!(matches!(Instruction::parse_one(partial), Err(ParseError::Incomplete)));
    }

    #[test]
    fn parses_two_back_to_back_instructions() {
        let combined = format!(
            "{}{}",
            InstructionBuilder::new("nop").build(),
            InstructionBuilder::new("sync").int(1).build()
        );
        let (first, consumed) = Instruction::parse_one(&combined).unwrap();
        assert_eq!(first.opcode(), "nop");
        let (second, _) = Instruction::parse_one(&combined[consumed..]).unwrap();
        assert_eq!(second.opcode(), "sync");
    }

    #[test]
    fn malformed_length_prefix_is_rejected() {
        assert!(matches!(Instruction::parse_one("x.bad;"), Err(ParseError::Malformed(_))));
    }
}
