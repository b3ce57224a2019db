//! Knob frame decoding.
//!
//! The panel sends one data line per sample period:
//!
//! ```text
//! 12|500|1023|0|877
//! ```
//!
//! Each token is the raw reading of one knob (10-bit ADC, 0..=1023). A line
//! is only a frame if it carries exactly as many tokens as there are knobs.

use regex::Regex;
use thiserror::Error;

/// Full-scale raw knob reading.
pub const MAX_KNOB_VALUE: u32 = 1023;

/// Token delimiter on the wire.
const DELIMITER: char = '|';

/// Errors produced while decoding a frame.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// The decoder was configured with zero knobs.
    #[error("knob count must be at least 1")]
    NoKnobs,

    /// The frame pattern could not be compiled (knob count too large).
    #[error("invalid frame pattern: {0}")]
    Pattern(String),

    /// The line does not have the configured shape.
    #[error("line does not match frame pattern: {line:?}")]
    Malformed { line: String },

    /// The line parsed into the wrong number of values.
    #[error("knobs[{expected}] != vals[{actual}]")]
    ArityMismatch { expected: usize, actual: usize },
}

/// One decoded line of raw knob readings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    values: Vec<u32>,
}

impl Frame {
    /// Returns the raw readings, in knob order.
    pub fn values(&self) -> &[u32] {
        &self.values
    }

    /// Returns the readings scaled to volume levels.
    pub fn levels(&self) -> Vec<f32> {
        scale_values(&self.values)
    }

    /// Returns the number of knobs in this frame.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true if the frame carries no values.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Builds the frame pattern for a knob count and decodes matching lines.
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    knobs: usize,
    pattern: Regex,
}

impl FrameDecoder {
    /// Creates a decoder for `knobs` values per frame.
    pub fn new(knobs: usize) -> Result<Self, FrameError> {
        if knobs == 0 {
            return Err(FrameError::NoKnobs);
        }
        let pattern =
            Regex::new(&frame_pattern(knobs)).map_err(|e| FrameError::Pattern(e.to_string()))?;
        Ok(Self { knobs, pattern })
    }

    /// Returns the configured knob count.
    pub fn knobs(&self) -> usize {
        self.knobs
    }

    /// Returns the anchored frame pattern.
    pub fn pattern(&self) -> &Regex {
        &self.pattern
    }

    /// Returns true if `line` is a well-formed frame.
    pub fn matches(&self, line: &str) -> bool {
        self.pattern.is_match(line)
    }

    /// Decodes a line into a frame.
    ///
    /// The whole frame is rejected if its arity differs from the knob count;
    /// there are no partial frames.
    pub fn decode(&self, line: &str) -> Result<Frame, FrameError> {
        if !self.matches(line) {
            return Err(FrameError::Malformed {
                line: line.to_string(),
            });
        }
        self.decode_unchecked(line)
    }

    /// Decodes a line already selected with [`FrameDecoder::pattern`].
    ///
    /// Only the arity is checked.
    pub fn decode_unchecked(&self, line: &str) -> Result<Frame, FrameError> {
        let values = parse_values(line);
        if values.len() != self.knobs {
            return Err(FrameError::ArityMismatch {
                expected: self.knobs,
                actual: values.len(),
            });
        }
        Ok(Frame { values })
    }
}

/// Builds `^d(?:\|d){n-1}$` where `d` is a 1 to 4 digit token.
fn frame_pattern(knobs: usize) -> String {
    let token = "[0-9]{1,4}";
    let mut pattern = format!("^{token}");
    for _ in 1..knobs {
        pattern.push_str(r"\|");
        pattern.push_str(token);
    }
    pattern.push('$');
    pattern
}

/// Splits a line on `|` and parses each token leniently.
///
/// A token parses as its leading run of ASCII digits; anything without
/// leading digits parses as 0.
pub fn parse_values(line: &str) -> Vec<u32> {
    line.split(DELIMITER).map(parse_token).collect()
}

fn parse_token(token: &str) -> u32 {
    token
        .trim_start()
        .bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0u32, |acc, digit| {
            acc.saturating_mul(10).saturating_add(u32::from(digit - b'0'))
        })
}

/// Maps raw readings to volume levels with `v / 1023`.
///
/// Readings above full scale produce levels above 1.0; callers decide
/// whether to clamp or reject them.
pub fn scale_values(values: &[u32]) -> Vec<f32> {
    values
        .iter()
        .map(|&v| v as f32 / MAX_KNOB_VALUE as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_accepts_exact_arity() {
        let decoder = FrameDecoder::new(3).unwrap();
        assert!(decoder.matches("12|500|1023"));
        assert!(decoder.matches("0|0|0"));
        assert!(decoder.matches("9999|1|1"));
    }

    #[test]
    fn pattern_rejects_wrong_shape() {
        let decoder = FrameDecoder::new(3).unwrap();
        assert!(!decoder.matches("12|500"));
        assert!(!decoder.matches("12|abc|3"));
        assert!(!decoder.matches("12|500|1023|4"));
        assert!(!decoder.matches("12|500|10234"));
        assert!(!decoder.matches("12||3"));
        assert!(!decoder.matches(" 12|500|1023"));
        assert!(!decoder.matches("12|500|1023\r"));
        assert!(!decoder.matches(""));
    }

    #[test]
    fn single_knob_pattern() {
        let decoder = FrameDecoder::new(1).unwrap();
        assert!(decoder.matches("511"));
        assert!(!decoder.matches("511|2"));
    }

    #[test]
    fn zero_knobs_rejected() {
        assert_eq!(FrameDecoder::new(0).unwrap_err(), FrameError::NoKnobs);
    }

    #[test]
    fn decode_valid_frame() {
        let decoder = FrameDecoder::new(5).unwrap();
        let frame = decoder.decode("0|1023|511|3|77").unwrap();
        assert_eq!(frame.values(), &[0, 1023, 511, 3, 77]);
        assert_eq!(frame.len(), 5);
    }

    #[test]
    fn decode_malformed_line() {
        let decoder = FrameDecoder::new(2).unwrap();
        let err = decoder.decode("KNOBMIX:PING").unwrap_err();
        assert!(matches!(err, FrameError::Malformed { .. }));
    }

    #[test]
    fn decode_unchecked_reports_arity() {
        let decoder = FrameDecoder::new(3).unwrap();
        let err = decoder.decode_unchecked("1|2").unwrap_err();
        assert_eq!(
            err,
            FrameError::ArityMismatch {
                expected: 3,
                actual: 2
            }
        );
        assert_eq!(err.to_string(), "knobs[3] != vals[2]");
    }

    #[test]
    fn lenient_token_parsing() {
        assert_eq!(parse_values("12|abc|3"), vec![12, 0, 3]);
        assert_eq!(parse_values("7x|  42|"), vec![7, 42, 0]);
        assert_eq!(parse_values("1023"), vec![1023]);
    }

    #[test]
    fn scaling_endpoints() {
        let levels = scale_values(&[0, 1023, 511]);
        assert_eq!(levels[0], 0.0);
        assert_eq!(levels[1], 1.0);
        assert!((levels[2] - 0.4995).abs() < 1e-3);
    }

    #[test]
    fn scaling_does_not_clamp() {
        let levels = scale_values(&[2046]);
        assert!((levels[0] - 2.0).abs() < f32::EPSILON);
    }

    #[test]
    fn frame_levels_match_scaling() {
        let decoder = FrameDecoder::new(2).unwrap();
        let frame = decoder.decode("1023|0").unwrap();
        assert_eq!(frame.levels(), vec![1.0, 0.0]);
    }
}
