//! Shared contact patterns
//!
//! Regex rules for phone numbers, email addresses, websites and labelled
//! names, used by every extractor that looks at running text. Overlapping
//! matches are reduced to the single highest-confidence one.

use once_cell::sync::Lazy;
use regex::Regex;

use cdp_core::ContactType;

/// Minimum digits for a phone-shaped match to be kept
const MIN_PHONE_DIGITS: usize = 6;

/// Words that end a labelled name ("Max Muster Tel. 0176...")
const NAME_STOP_WORDS: &[&str] = &[
    "tel", "telefon", "phone", "mobil", "handy", "fax", "email", "e", "mail", "web", "www",
];

/// A pattern hit inside a piece of text
#[derive(Debug, Clone, PartialEq)]
pub struct PatternMatch {
    pub contact_type: ContactType,
    pub value: String,
    /// Byte offsets of `value` in the searched text
    pub start: usize,
    pub end: usize,
    pub confidence: f32,
}

struct PatternRule {
    regex: Regex,
    contact_type: ContactType,
    confidence: f32,
}

/// Rule-based contact matcher
pub struct ContactPatterns {
    rules: Vec<PatternRule>,
}

static DEFAULT_PATTERNS: Lazy<ContactPatterns> = Lazy::new(ContactPatterns::new);

impl ContactPatterns {
    /// Create the default German/English rule set
    pub fn new() -> Self {
        let mut patterns = Self { rules: Vec::new() };
        patterns.init_rules();
        patterns
    }

    /// Shared default instance
    pub fn shared() -> &'static ContactPatterns {
        &DEFAULT_PATTERNS
    }

    fn init_rules(&mut self) {
        // Email
        self.add_rule(
            r"(?i)\b[a-z0-9._%+-]+@[a-z0-9-]+(?:\.[a-z0-9-]+)*\.[a-z]{2,}\b",
            ContactType::Email,
            0.7,
        );

        // Labelled phone numbers; the capture group is the number
        self.add_rule(
            r"(?i)\b(?:tel(?:efon)?|phone|mobil(?:e)?|handy|fon|rufnummer)\.?\s*(?:nr\.?\s*)?:?\s*(\+?[\d(][\d\s()/.-]{5,}\d)",
            ContactType::Phone,
            0.7,
        );

        // International and national phone numbers
        self.add_rule(
            r"\+\d{1,3}[\s./-]?(?:\(0\)[\s./-]?)?\d{2,5}(?:[\s./-]?\d+){1,4}",
            ContactType::Phone,
            0.65,
        );
        self.add_rule(
            r"\b0\d{2,5}(?:[\s/.-]?\d{2,}){1,4}\b",
            ContactType::Phone,
            0.6,
        );

        // Websites
        self.add_rule(
            r#"(?i)\b(?:https?://|www\.)[a-z0-9-]+(?:\.[a-z0-9-]+)*\.[a-z]{2,}(?::\d+)?(?:/[^\s<>"']*)?"#,
            ContactType::Website,
            0.6,
        );

        // Labelled names; the salutation stays outside the capture group
        self.add_rule(
            r"(?:(?i:ansprechpartner(?:in)?|kontaktperson|kontakt|contact(?:\s+person)?|vermieter(?:in)?|makler(?:in)?|landlord|agent))\s*:\s*(?:(?:Herr|Frau|Mr\.?|Mrs\.?|Ms\.?)\s+)?([A-ZÄÖÜ][a-zäöüß]+(?:[ -][A-ZÄÖÜ][a-zäöüß]+){0,3})",
            ContactType::Name,
            0.5,
        );
    }

    /// Add a regex rule
    fn add_rule(&mut self, pattern: &str, contact_type: ContactType, confidence: f32) {
        match Regex::new(pattern) {
            Ok(regex) => self.rules.push(PatternRule {
                regex,
                contact_type,
                confidence,
            }),
            Err(e) => tracing::error!("Skipping invalid contact pattern: {}", e),
        }
    }

    /// Find all non-overlapping contact matches in `text`
    pub fn find_matches(&self, text: &str) -> Vec<PatternMatch> {
        let mut matches = Vec::new();

        for rule in &self.rules {
            for caps in rule.regex.captures_iter(text) {
                let Some(m) = caps.get(1).or_else(|| caps.get(0)) else {
                    continue;
                };
                if let Some(found) = Self::accept(rule, text, m.start(), m.end()) {
                    matches.push(found);
                }
            }
        }

        deduplicate(matches)
    }

    /// Find matches of one contact type only
    pub fn find_type(&self, text: &str, contact_type: ContactType) -> Vec<PatternMatch> {
        self.find_matches(text)
            .into_iter()
            .filter(|m| m.contact_type == contact_type)
            .collect()
    }

    fn accept(rule: &PatternRule, text: &str, start: usize, end: usize) -> Option<PatternMatch> {
        let raw = &text[start..end];

        let value = match rule.contact_type {
            ContactType::Phone => {
                let digits = raw.chars().filter(|c| c.is_ascii_digit()).count();
                if digits < MIN_PHONE_DIGITS {
                    return None;
                }
                raw.trim().to_string()
            }
            ContactType::Website => raw.trim_end_matches(['.', ',', ';', ':', ')', '!', '?']).to_string(),
            ContactType::Name => trim_name(raw),
            ContactType::Email => raw.to_string(),
        };

        if value.is_empty() {
            return None;
        }

        let leading = raw.len() - raw.trim_start().len();
        let start = start + leading;

        Some(PatternMatch {
            contact_type: rule.contact_type,
            end: start + value.len(),
            start,
            value,
            confidence: rule.confidence,
        })
    }
}

impl Default for ContactPatterns {
    fn default() -> Self {
        Self::new()
    }
}

fn trim_name(raw: &str) -> String {
    let mut words: Vec<&str> = raw.split_whitespace().collect();
    while let Some(last) = words.last() {
        if NAME_STOP_WORDS.contains(&last.to_lowercase().as_str()) {
            words.pop();
        } else {
            break;
        }
    }
    words.join(" ")
}

/// Remove overlapping matches, keeping the highest-confidence one
///
/// Ties prefer the longer match, then the earlier one. The result is in
/// text order.
pub fn deduplicate(mut matches: Vec<PatternMatch>) -> Vec<PatternMatch> {
    matches.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then((b.end - b.start).cmp(&(a.end - a.start)))
            .then(a.start.cmp(&b.start))
    });

    let mut result: Vec<PatternMatch> = Vec::new();
    for m in matches {
        let overlaps = result.iter().any(|kept| m.start < kept.end && kept.start < m.end);
        if !overlaps {
            result.push(m);
        }
    }

    result.sort_by_key(|m| m.start);
    result
}

// ============================================================================
// Text helpers
// ============================================================================

/// Snippet of up to `window` characters on each side of `[start, end)`
///
/// Whitespace inside the snippet is collapsed.
pub fn context_window(text: &str, start: usize, end: usize, window: usize) -> String {
    let start = start.min(text.len());
    let end = end.clamp(start, text.len());

    let from = if window == 0 {
        start
    } else {
        text[..start]
            .char_indices()
            .rev()
            .take(window)
            .last()
            .map(|(i, _)| i)
            .unwrap_or(start)
    };
    let to = text[end..]
        .char_indices()
        .nth(window)
        .map(|(i, _)| end + i)
        .unwrap_or(text.len());

    text[from..to].split_whitespace().collect::<Vec<_>>().join(" ")
}

static DEOBFUSCATION_RULES: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"(?i)\s*[\[({]\s*(?:at|ät)\s*[\])}]\s*", "@"),
        (r"(?i)\s*[\[({]\s*(?:dot|punkt)\s*[\])}]\s*", "."),
        (r"(?i)\b([a-z0-9._%+-]+) at ([a-z0-9-]+(?:\.| dot )[a-z]{2,})\b", "$1@$2"),
        (r"(?i)(@[a-z0-9.-]+) dot ([a-z]{2,})\b", "$1.$2"),
    ]
    .into_iter()
    .filter_map(|(pattern, replacement)| Regex::new(pattern).ok().map(|r| (r, replacement)))
    .collect()
});

/// Undo common address obfuscation ("info [at] example [dot] de")
pub fn deobfuscate(text: &str) -> String {
    let mut out = text.to_string();
    for (regex, replacement) in DEOBFUSCATION_RULES.iter() {
        out = regex.replace_all(&out, *replacement).into_owned();
    }
    out
}

static HTML_RULES: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"(?is)<(script|style)\b.*?</(script|style)>", " "),
        (r"(?i)<br\s*/?>|</p>|</div>|</li>", "\n"),
        (r"(?s)<[^>]*>", " "),
    ]
    .into_iter()
    .filter_map(|(pattern, replacement)| Regex::new(pattern).ok().map(|r| (r, replacement)))
    .collect()
});

const HTML_ENTITIES: &[(&str, &str)] = &[
    ("&nbsp;", " "),
    ("&#64;", "@"),
    ("&#x40;", "@"),
    ("&#46;", "."),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&quot;", "\""),
    ("&amp;", "&"),
];

/// Visible text of an HTML document
pub fn strip_html(html: &str) -> String {
    let mut text = html.to_string();
    for (regex, replacement) in HTML_RULES.iter() {
        text = regex.replace_all(&text, *replacement).into_owned();
    }
    for (entity, replacement) in HTML_ENTITIES {
        text = text.replace(entity, replacement);
    }
    text
}

/// Decode `%XX` escapes as found in `mailto:` / `tel:` links
pub fn percent_decode(value: &str) -> String {
    let bytes = value.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(byte) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}
