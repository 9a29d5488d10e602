//! Section label detection for rulebook chunks.

use regex::Regex;
use std::sync::LazyLock;

const MAX_LABEL_CHARS: usize = 140;

static RULE_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^r[èe]gle\s*\d+(:|\s|–|-)").expect("rule heading pattern is a valid regex")
});

static TOPIC_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(string|mise|relance|action|p[ée]nalit[ée]|proc[ée]dure)")
        .expect("topic heading pattern is a valid regex")
});

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern is a valid regex"));

/// Guess a section label from the lines of a chunk.
///
/// Candidates are tried in order of confidence over all lines: a numbered
/// rule heading (`Règle 12 :`), then a line opening with a rule-topic
/// keyword, then an all-caps title between 9 and 119 characters. Returns an
/// empty string when no line qualifies.
pub fn detect_section(text: &str) -> String {
    let lines: Vec<&str> = text
        .split('\n')
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();

    let hit = lines
        .iter()
        .find(|l| RULE_HEADING.is_match(l))
        .or_else(|| lines.iter().find(|l| TOPIC_HEADING.is_match(l)))
        .or_else(|| lines.iter().find(|l| is_caps_title(l)));

    match hit {
        Some(line) => WHITESPACE
            .replace_all(line, " ")
            .chars()
            .take(MAX_LABEL_CHARS)
            .collect(),
        None => String::new(),
    }
}

fn is_caps_title(line: &str) -> bool {
    let len = line.chars().count();
    len > 8 && len < 120 && line.chars().any(char::is_alphabetic) && line.to_uppercase() == line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefers_numbered_rule_heading() {
        let chunk = "CHAPITRE GÉNÉRAL\nIntro text.\nRègle 12 :   Cartes  exposées\nDetails.";
        assert_eq!(detect_section(chunk), "Règle 12 : Cartes exposées");

        assert_eq!(detect_section("regle 3- Bouton"), "regle 3- Bouton");
    }

    #[test]
    fn test_falls_back_to_topic_then_caps_title() {
        assert_eq!(
            detect_section("some prose\nPénalités applicables aux joueurs\nMORE"),
            "Pénalités applicables aux joueurs"
        );
        assert_eq!(
            detect_section("some prose\n  DÉROULEMENT DU TOURNOI  \nmore prose"),
            "DÉROULEMENT DU TOURNOI"
        );
    }

    #[test]
    fn test_rejects_short_numeric_and_plain_lines() {
        assert_eq!(detect_section("SHORT\n12345678901\nplain text only"), "");
        assert_eq!(detect_section(""), "");
    }

    #[test]
    fn test_label_is_capped() {
        let long = format!("Règle 1 : {}", "x".repeat(300));
        assert_eq!(detect_section(&long).chars().count(), MAX_LABEL_CHARS);
    }
}
