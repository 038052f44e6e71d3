use crate::card::Chips;
use serde::{Deserialize, Serialize};

/// Renders chip counts for human-readable messages.
///
/// Carried by the table and handed to anything that builds text, instead of a
/// process-wide printer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChipFormatter {
    pub thousands_separator: Option<char>,
}

impl Default for ChipFormatter {
    fn default() -> Self {
        ChipFormatter { thousands_separator: Some(',') }
    }
}

impl ChipFormatter {
    pub fn plain() -> ChipFormatter {
        ChipFormatter { thousands_separator: None }
    }

    pub fn amount(&self, chips: Chips) -> String {
        let digits = chips.to_string();
        let Some(sep) = self.thousands_separator else {
            return digits;
        };

        let mut out = String::with_capacity(digits.len() + digits.len() / 3);
        for (i, ch) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                out.push(sep);
            }
            out.push(ch);
        }
        out
    }

    /// `"1,500 chips"`
    pub fn chips(&self, chips: Chips) -> String {
        format!("{} chips", self.amount(chips))
    }
}
