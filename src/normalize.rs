use chrono::{Datelike, NaiveDateTime, Timelike};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

pub const ZWNJ: char = '\u{200c}';
pub const DEFAULT_TAG: &str = "PRODUCT";

const PERSIAN_DIGITS: [char; 10] = ['۰', '۱', '۲', '۳', '۴', '۵', '۶', '۷', '۸', '۹'];

/// A spreadsheet cell as read from disk, before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Empty,
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    DateTime(NaiveDateTime),
}

pub fn to_persian_digits(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_digit() {
                PERSIAN_DIGITS[(c as u8 - b'0') as usize]
            } else {
                c
            }
        })
        .collect()
}

/// Gregorian -> Solar Hijri date. Valid for any year after 1 AD.
pub fn gregorian_to_jalali(gy: i64, gm: u32, gd: u32) -> (i64, u32, u32) {
    const G_D_M: [i64; 12] = [0, 31, 59, 90, 120, 151, 181, 212, 243, 273, 304, 334];
    let gm_idx = (gm.clamp(1, 12) - 1) as usize;
    let gy2 = if gm > 2 { gy + 1 } else { gy };
    let mut days = 355666 + 365 * gy + (gy2 + 3) / 4 - (gy2 + 99) / 100 + (gy2 + 399) / 400
        + gd as i64
        + G_D_M[gm_idx];
    let mut jy = -1595 + 33 * (days / 12053);
    days %= 12053;
    jy += 4 * (days / 1461);
    days %= 1461;
    if days > 365 {
        jy += (days - 1) / 365;
        days = (days - 1) % 365;
    }
    let (jm, jd) = if days < 186 {
        (1 + days / 31, 1 + days % 31)
    } else {
        (7 + (days - 186) / 30, 1 + (days - 186) % 30)
    };
    (jy, jm as u32, jd as u32)
}

/// `YYYY/MM/DD  HH:MM` in the Jalali calendar, rendered with Persian digits.
pub fn to_jalali_str(d: &NaiveDateTime) -> String {
    let (jy, jm, jd) = gregorian_to_jalali(d.year() as i64, d.month(), d.day());
    let latin = format!(
        "{:04}/{:02}/{:02}  {:02}:{:02}",
        jy,
        jm,
        jd,
        d.hour(),
        d.minute()
    );
    to_persian_digits(&latin)
}

/// Missing values collapse to `""`, datetimes become Jalali strings, everything
/// else passes through.
pub fn normalize_value(cell: &Cell) -> Value {
    match cell {
        Cell::Empty => Value::String(String::new()),
        Cell::Text(s) => Value::String(s.clone()),
        Cell::Int(n) => Value::from(*n),
        Cell::Float(f) => serde_json::Number::from_f64(*f)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(String::new())),
        Cell::Bool(b) => Value::Bool(*b),
        Cell::DateTime(d) => Value::String(to_jalali_str(d)),
    }
}

/// Text form of a normalized value. Integral floats print without a fraction
/// so numeric phone and status cells read the same as their text forms.
pub fn value_text(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return i.to_string();
            }
            match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
                Some(f) => f.to_string(),
                None => n.to_string(),
            }
        }
        Value::Array(items) => items.iter().map(value_text).collect::<Vec<_>>().join(", "),
        Value::Object(_) => v.to_string(),
    }
}

pub fn status_is_present(v: &Value) -> bool {
    if let Value::Number(n) = v {
        return n.as_f64() == Some(1.0);
    }
    let s = value_text(v).trim().to_lowercase();
    if matches!(
        s.as_str(),
        "1" | "1.0" | "true" | "yes" | "y" | "present" | "ok"
    ) {
        return true;
    }
    s.parse::<f64>().map(|f| f == 1.0).unwrap_or(false)
}

/// Normalizes Iranian mobile numbers to `09xxxxxxxxx`.
/// Accepts `+98`, `0098`, `98`, `0` and bare `9…` prefixes; anything that does
/// not leave ten digits starting with 9 yields `""`.
pub fn format_mobile(raw: &str, pretty: bool) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    let mut rest = digits.as_str();
    if let Some(r) = rest.strip_prefix("00") {
        rest = r;
    }
    if let Some(r) = rest.strip_prefix("98") {
        rest = r;
    }
    if let Some(r) = rest.strip_prefix('0') {
        rest = r;
    }

    if rest.len() != 10 || !rest.starts_with('9') {
        return String::new();
    }
    let normalized = format!("0{rest}");
    if !pretty {
        return normalized;
    }
    format!(
        "{} {} {}",
        &normalized[..4],
        &normalized[4..7],
        &normalized[7..]
    )
}

fn clean_items<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    items
        .into_iter()
        .map(|s| s.as_ref().trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

pub fn parse_list(v: &Value) -> Vec<String> {
    match v {
        Value::Null => Vec::new(),
        Value::Array(items) => clean_items(items.iter().map(value_text)),
        other => parse_list_text(&value_text(other)),
    }
}

pub fn parse_list_text(raw: &str) -> Vec<String> {
    let s = raw.trim();
    if s.is_empty() {
        return Vec::new();
    }
    if s.starts_with('[') && s.ends_with(']') {
        if let Some(items) = parse_literal_list(s) {
            return clean_items(items);
        }
    }
    if s.contains(',') {
        return clean_items(s.split(','));
    }
    vec![s.to_string()]
}

/// Parses a list literal such as `['a', "b", 3]`. Returns `None` for anything
/// that is not a flat list of strings, numbers, booleans or `None`.
fn parse_literal_list(s: &str) -> Option<Vec<String>> {
    let chars: Vec<char> = s.chars().collect();
    let mut i = 0usize;
    let skip_ws = |i: &mut usize| {
        while *i < chars.len() && chars[*i].is_whitespace() {
            *i += 1;
        }
    };

    skip_ws(&mut i);
    if chars.get(i) != Some(&'[') {
        return None;
    }
    i += 1;

    let mut out = Vec::new();
    loop {
        skip_ws(&mut i);
        match chars.get(i) {
            None => return None,
            Some(']') => {
                i += 1;
                break;
            }
            Some(&q) if q == '\'' || q == '"' => {
                i += 1;
                let mut buf = String::new();
                loop {
                    let c = *chars.get(i)?;
                    i += 1;
                    if c == q {
                        break;
                    }
                    if c != '\\' {
                        buf.push(c);
                        continue;
                    }
                    let esc = *chars.get(i)?;
                    i += 1;
                    match esc {
                        'n' => buf.push('\n'),
                        't' => buf.push('\t'),
                        'r' => buf.push('\r'),
                        'u' => {
                            let hex: String = chars.get(i..i + 4)?.iter().collect();
                            let code = u32::from_str_radix(&hex, 16).ok()?;
                            buf.push(char::from_u32(code)?);
                            i += 4;
                        }
                        other => buf.push(other),
                    }
                }
                out.push(buf);
            }
            Some(_) => {
                let start = i;
                while i < chars.len() && chars[i] != ',' && chars[i] != ']' {
                    i += 1;
                }
                let token: String = chars[start..i].iter().collect();
                let token = token.trim();
                let valid = token.parse::<f64>().is_ok()
                    || matches!(token, "True" | "False" | "None");
                if !valid {
                    return None;
                }
                out.push(token.to_string());
            }
        }

        skip_ws(&mut i);
        match chars.get(i) {
            Some(',') => i += 1,
            Some(']') => {
                i += 1;
                break;
            }
            _ => return None,
        }
    }

    skip_ws(&mut i);
    if i != chars.len() {
        return None;
    }
    Some(out)
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("valid whitespace regex"))
}

fn fintech_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^فین\s*تک$").expect("valid fintech regex"))
}

pub fn normalize_interest_term(raw: &str) -> String {
    // Sheets exported through some tools carry the joiner as escaped text.
    let s = raw.trim().replace("\\u200c", &ZWNJ.to_string());
    let s = whitespace_re().replace_all(&s, " ");
    let s = s.trim();
    if fintech_re().is_match(s) {
        return format!("فین{ZWNJ}تک");
    }
    s.to_string()
}

/// Maps free-text categories onto `AI`, `SOFTWARE` or `PRODUCT`.
pub fn normalize_tag(raw: &str) -> String {
    let collapsed = whitespace_re().replace_all(raw.trim(), " ");
    if collapsed.is_empty() {
        return DEFAULT_TAG.to_string();
    }
    let up = collapsed.to_uppercase();
    match up.as_str() {
        "AI" | "A.I" | "A I" => "AI".to_string(),
        "SOFTWARE" | "SW" => "SOFTWARE".to_string(),
        "PRODUCT" | "PROD" => "PRODUCT".to_string(),
        _ => up,
    }
}

pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    #[test]
    fn mobile_prefix_variants_collapse() {
        for raw in [
            "+98 912 345 6789",
            "00989123456789",
            "989123456789",
            "09123456789",
            "9123456789",
        ] {
            assert_eq!(format_mobile(raw, false), "09123456789", "input {raw}");
        }
        assert_eq!(format_mobile("0912345678", false), "");
        assert_eq!(format_mobile("", false), "");
        assert_eq!(format_mobile("02188776655", false), "");
        assert_eq!(format_mobile("+98 912 345 6789", true), "0912 345 6789");
    }

    #[test]
    fn tag_synonyms_and_defaults() {
        assert_eq!(normalize_tag("sw"), "SOFTWARE");
        assert_eq!(normalize_tag("Software"), "SOFTWARE");
        assert_eq!(normalize_tag(" SOFTWARE "), "SOFTWARE");
        assert_eq!(normalize_tag("a  i"), "AI");
        assert_eq!(normalize_tag("A.I"), "AI");
        assert_eq!(normalize_tag("prod"), "PRODUCT");
        assert_eq!(normalize_tag(""), "PRODUCT");
        assert_eq!(normalize_tag("   "), "PRODUCT");
        assert_eq!(normalize_tag("Marketing"), "MARKETING");
    }

    #[test]
    fn jalali_known_dates() {
        assert_eq!(gregorian_to_jalali(2024, 3, 20), (1403, 1, 1));
        assert_eq!(gregorian_to_jalali(2024, 3, 19), (1402, 12, 29));
        assert_eq!(gregorian_to_jalali(1979, 2, 11), (1357, 11, 22));
        assert_eq!(gregorian_to_jalali(2000, 1, 1), (1378, 10, 11));
    }

    #[test]
    fn jalali_string_uses_persian_digits() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 20)
            .and_then(|d| d.and_hms_opt(9, 5, 0))
            .expect("valid datetime");
        assert_eq!(to_jalali_str(&d), "۱۴۰۳/۰۱/۰۱  ۰۹:۰۵");
        assert_eq!(
            normalize_value(&Cell::DateTime(d)),
            json!("۱۴۰۳/۰۱/۰۱  ۰۹:۰۵")
        );
    }

    #[test]
    fn missing_values_become_empty_text() {
        assert_eq!(normalize_value(&Cell::Empty), json!(""));
        assert_eq!(normalize_value(&Cell::Float(f64::NAN)), json!(""));
        assert_eq!(normalize_value(&Cell::Int(7)), json!(7));
        assert_eq!(normalize_value(&Cell::Text(" x ".into())), json!(" x "));
    }

    #[test]
    fn value_text_drops_integral_fraction() {
        assert_eq!(value_text(&json!(9123456789.0)), "9123456789");
        assert_eq!(value_text(&json!(1.5)), "1.5");
        assert_eq!(value_text(&json!(true)), "True");
    }

    #[test]
    fn status_filter_forms() {
        for v in [
            json!(1),
            json!(1.0),
            json!("1.0"),
            json!("yes"),
            json!("Present"),
            json!(" OK "),
        ] {
            assert!(status_is_present(&v), "{v} should be present");
        }
        for v in [json!(0), json!(""), json!("no"), json!(2), json!("absent")] {
            assert!(!status_is_present(&v), "{v} should be absent");
        }
    }

    #[test]
    fn list_parsing_modes() {
        assert_eq!(
            parse_list(&json!("['هوش مصنوعی', 'فین تک', ' ']")),
            vec!["هوش مصنوعی", "فین تک"]
        );
        assert_eq!(parse_list(&json!("[\"a\", 2]")), vec!["a", "2"]);
        assert_eq!(parse_list(&json!("[a, b]")), vec!["[a", "b]"]);
        assert_eq!(parse_list(&json!("x, y ,, z")), vec!["x", "y", "z"]);
        assert_eq!(parse_list(&json!("  solo  ")), vec!["solo"]);
        assert_eq!(parse_list(&json!("[broken")), vec!["[broken"]);
        assert_eq!(parse_list(&json!(["  a ", ""])), vec!["a"]);
        assert!(parse_list(&json!("")).is_empty());
        assert!(parse_list(&json!("[]")).is_empty());
    }

    #[test]
    fn literal_list_decodes_escapes() {
        assert_eq!(
            parse_list(&json!(r"['نیم\u200cفاصله', 'it\'s']")),
            vec!["نیم\u{200c}فاصله", "it's"]
        );
    }

    #[test]
    fn interest_terms_restore_joiner() {
        assert_eq!(normalize_interest_term("  فین   تک "), "فین\u{200c}تک");
        assert_eq!(normalize_interest_term("فینتک"), "فین\u{200c}تک");
        assert_eq!(
            normalize_interest_term(r"نیم\u200cفاصله"),
            "نیم\u{200c}فاصله"
        );
        assert_eq!(normalize_interest_term("a \t b"), "a b");
    }

    #[test]
    fn flag_parsing() {
        assert_eq!(parse_flag("On"), Some(true));
        assert_eq!(parse_flag(" 0 "), Some(false));
        assert_eq!(parse_flag("maybe"), None);
    }
}
