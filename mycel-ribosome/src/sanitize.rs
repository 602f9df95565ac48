//! String sanitizer for code generation
//!
//! Everything embedded into generated JavaScript goes through here: newlines
//! and carriage returns are stripped, double quotes escaped.

pub fn js_sanitize(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\n' | '\r' => {}
            '"' => out.push_str("\\\""),
            other => out.push(other),
        }
    }
    out
}
