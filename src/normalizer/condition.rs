//! AIの状態評価テキストの正規化
//!
//! "Good", "needs replacement", "4/5" のような自由記述を `Condition` に対応付ける。

use inspection_common::Condition;
use regex::Regex;

/// 評価テキストを `Condition` に変換。解釈できなければ `None`
pub fn normalize_condition(rating: &str) -> Option<Condition> {
    let text = rating.trim().to_lowercase();
    if text.is_empty() {
        return None;
    }

    lazy_static::lazy_static! {
        static ref SEPARATOR_RE: Regex = Regex::new(r"[\s\-]+").unwrap();
        // "4/5", "4 out of 5", "7.5/10"
        static ref SCORE_RE: Regex =
            Regex::new(r"(\d+(?:\.\d+)?)\s*(?:/|out of)\s*(\d+(?:\.\d+)?)").unwrap();
    }

    let key = SEPARATOR_RE.replace_all(&text, "_");
    if let Ok(condition) = key.parse::<Condition>() {
        return Some(condition);
    }

    if let Some(cap) = SCORE_RE.captures(&text) {
        let score: f64 = cap[1].parse().ok()?;
        let scale: f64 = cap[2].parse().ok()?;
        if scale > 0.0 {
            return Some(from_ratio(score / scale));
        }
    }

    from_keywords(&text)
}

fn from_ratio(ratio: f64) -> Condition {
    if ratio >= 0.9 {
        Condition::Excellent
    } else if ratio >= 0.7 {
        Condition::Good
    } else if ratio >= 0.5 {
        Condition::Fair
    } else if ratio >= 0.3 {
        Condition::Poor
    } else {
        Condition::NeedsReplacement
    }
}

fn from_keywords(text: &str) -> Option<Condition> {
    // 強い表現から順に判定
    const KEYWORDS: &[(&[&str], Condition)] = &[
        (&["replace", "replacing", "broken", "beyond repair"], Condition::NeedsReplacement),
        (&["excellent", "like new", "very good", "pristine"], Condition::Excellent),
        (&["poor", "bad", "damaged"], Condition::Poor),
        (&["fair", "average", "satisfactory", "acceptable", "worn"], Condition::Fair),
        (&["good"], Condition::Good),
    ];

    KEYWORDS
        .iter()
        .find(|(words, _)| words.iter().any(|w| text.contains(w)))
        .map(|(_, condition)| *condition)
}
