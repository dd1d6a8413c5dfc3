use crate::base64;

/// A single value to be rendered as a length-prefixed wire field.
#[derive(Debug, Clone)]
pub enum FieldValue<'a> {
    Int(i64),
    Double(f64),
    Str(&'a str),
    /// Binary payload; rendered base64-encoded.
    Blob(&'a [u8]),
}

impl FieldValue<'_> {
    /// Render as `<codepoint-count>.<payload>`, *without* a trailing
    /// comma or semicolon — the caller joins fields and terminates the
    /// instruction.
    #[must_use]
    pub fn render(&self) -> String {
        let payload = match self {
            FieldValue::Int(v) => v.to_string(),
            FieldValue::Double(v) => format_double(*v),
            FieldValue::Str(s) => (*s).to_string(),
            FieldValue::Blob(bytes) => base64::encode(bytes),
        };
        render_length_prefixed(&payload)
    }
}

/// Render an already-stringified payload as a length-prefixed field.
/// The length prefix counts Unicode code points, not bytes.
#[must_use]
pub fn render_length_prefixed(payload: &str) -> String {
    let codepoints = payload.chars().count();
    format!("{codepoints}.{payload}")
}

/// Format a double with sixteen significant decimal digits, in the style
/// of C's `%.16g`. This is an approximation of `%g`: trailing zeros are
/// not stripped, since the wire format has no requirement that they be.
#[must_use]
pub fn format_double(value: f64) -> String {
    if !value.is_finite() {
        return format!("{value}");
    }
    if value == 0.0 {
        return "0".to_string();
    }

    const SIGNIFICANT_DIGITS: i32 = 16;
    let magnitude = value.abs().log10().floor() as i32;
    let decimals = (SIGNIFICANT_DIGITS - 1 - magnitude).max(0) as usize;
    format!("{value:.decimals$}")
}
