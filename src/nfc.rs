//! Unicode Normalization Form C, the other external collaborator spec.md
//! assumes is available. Thin wrapper over `unicode-normalization` so
//! `ls` can apply it to every entry name it returns, per spec §4.5.

use unicode_normalization::UnicodeNormalization;

/// Normalize `input` to NFC.
pub fn nfc(input: &str) -> String {
    input.nfc().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn composes_decomposed_accents() {
        // "e" + combining acute accent decomposed form -> precomposed "é"
        let decomposed = "e\u{0301}";
        assert_eq!(nfc(decomposed), "\u{00e9}");
    }

    #[test]
    fn leaves_already_composed_text_alone() {
        assert_eq!(nfc("café"), "café");
    }
}
