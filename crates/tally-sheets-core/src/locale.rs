//! Locale-aware value parsing and display formatting
//!
//! User input is parsed into typed values honoring the locale's decimal
//! and group separators and its short-date component order. Display
//! rendering goes the other way, through a number-format mini-language.
//! Locale data itself (currency symbols, month names) is supplied by an
//! external collaborator; this module only implements the contract.

use crate::cell::{CellError, CellValue};
use crate::style::NumberFormat;
use chrono::{Datelike, NaiveDate};
use lazy_regex::regex;
use rust_decimal::{Decimal, RoundingStrategy};

/// Component order of short date literals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateOrder {
    /// e.g. 3/14/2024
    MonthDayYear,
    /// e.g. 14.3.2024
    DayMonthYear,
    /// e.g. 2024-3-14
    YearMonthDay,
}

/// Number and date conventions for parsing and rendering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locale {
    /// Decimal separator, e.g. '.' or ','
    pub decimal_separator: char,
    /// Digit group separator, e.g. ',' or '.'
    pub group_separator: char,
    /// Short-date component order
    pub date_order: DateOrder,
}

impl Locale {
    /// US English conventions: period decimal, comma groups, M/D/Y
    pub fn en_us() -> Self {
        Self {
            decimal_separator: '.',
            group_separator: ',',
            date_order: DateOrder::MonthDayYear,
        }
    }

    /// German conventions: comma decimal, period groups, D.M.Y
    pub fn de_de() -> Self {
        Self {
            decimal_separator: ',',
            group_separator: '.',
            date_order: DateOrder::DayMonthYear,
        }
    }

    /// ISO-leaning conventions: period decimal, comma groups, Y-M-D
    pub fn iso() -> Self {
        Self {
            decimal_separator: '.',
            group_separator: ',',
            date_order: DateOrder::YearMonthDay,
        }
    }

    /// The short-date pattern for this locale's component order
    pub fn date_format(&self) -> NumberFormat {
        match self.date_order {
            DateOrder::MonthDayYear => NumberFormat::Custom("m/d/yyyy".into()),
            DateOrder::DayMonthYear => NumberFormat::Custom("d.m.yyyy".into()),
            DateOrder::YearMonthDay => NumberFormat::Custom("yyyy-mm-dd".into()),
        }
    }
}

impl Default for Locale {
    fn default() -> Self {
        Self::en_us()
    }
}

/// Result of parsing user input: the typed value plus the number format
/// the entry implies (a date literal suggests a date format, a percent
/// suffix a percent format).
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedInput {
    /// The parsed value
    pub value: CellValue,
    /// Format implied by the input's spelling, if any
    pub suggested_format: Option<NumberFormat>,
}

impl ParsedInput {
    fn plain(value: CellValue) -> Self {
        Self {
            value,
            suggested_format: None,
        }
    }
}

/// Serial-number epoch: day 0 is 1899-12-30
fn serial_epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1899, 12, 30).expect("valid epoch")
}

/// Convert a calendar date to its serial number
pub fn date_to_serial(date: NaiveDate) -> f64 {
    (date - serial_epoch()).num_days() as f64
}

/// Convert a serial number back to a calendar date
pub fn serial_to_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() {
        return None;
    }
    serial_epoch().checked_add_signed(chrono::Duration::days(serial.floor() as i64))
}

/// Parse user-entered text into a typed value.
///
/// Tried in order: forced text (leading apostrophe), boolean literal,
/// date literal (locale component order), number literal (locale
/// separators, scientific notation, percent suffix), error token, and
/// finally text. A string with a numeric prefix but trailing garbage
/// ("3rd") stays text.
pub fn parse_user_input(text: &str, locale: &Locale) -> ParsedInput {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return ParsedInput::plain(CellValue::Empty);
    }

    if let Some(rest) = trimmed.strip_prefix('\'') {
        return ParsedInput::plain(CellValue::string(rest));
    }

    match trimmed.to_uppercase().as_str() {
        "TRUE" => return ParsedInput::plain(CellValue::Boolean(true)),
        "FALSE" => return ParsedInput::plain(CellValue::Boolean(false)),
        _ => {}
    }

    if let Some(date) = parse_date_literal(trimmed, locale) {
        return ParsedInput {
            value: CellValue::Number(date_to_serial(date)),
            suggested_format: Some(locale.date_format()),
        };
    }

    if let Some((number, percent)) = parse_number_literal(trimmed, locale) {
        let format = percent.then(NumberFormat::percent);
        return ParsedInput {
            value: CellValue::Number(number),
            suggested_format: format,
        };
    }

    if let Some(err) = CellError::from_token(trimmed) {
        return ParsedInput::plain(CellValue::Error(err));
    }

    ParsedInput::plain(CellValue::string(trimmed))
}

/// Parse a short date literal in the locale's component order.
pub fn parse_date_literal(text: &str, locale: &Locale) -> Option<NaiveDate> {
    let caps = regex!(r"^(\d{1,4})[./\-](\d{1,2})[./\-](\d{1,4})$").captures(text)?;
    let a: u32 = caps[1].parse().ok()?;
    let b: u32 = caps[2].parse().ok()?;
    let c: u32 = caps[3].parse().ok()?;

    let (year, month, day) = match locale.date_order {
        DateOrder::MonthDayYear => (c, a, b),
        DateOrder::DayMonthYear => (c, b, a),
        DateOrder::YearMonthDay => (a, b, c),
    };
    let year = normalize_year(year)?;
    NaiveDate::from_ymd_opt(year, month, day)
}

fn normalize_year(year: u32) -> Option<i32> {
    match year {
        0..=69 => Some(2000 + year as i32),
        70..=99 => Some(1900 + year as i32),
        100..=9999 => Some(year as i32),
        _ => None,
    }
}

/// Parse a number literal under the locale's separators.
///
/// Returns the value and whether a percent suffix was consumed. Group
/// separators are only accepted in well-formed 3-digit groups, so "4,3"
/// is NOT forty-three under en-US (it is text there, and 4.3 under a
/// comma-decimal locale).
pub fn parse_number_literal(text: &str, locale: &Locale) -> Option<(f64, bool)> {
    let mut s = text.trim();
    let percent = if let Some(stripped) = s.strip_suffix('%') {
        s = stripped.trim_end();
        true
    } else {
        false
    };

    let canonical = canonicalize_number(s, locale)?;
    if !regex!(r"^[+-]?(?:\d+(?:\.\d*)?|\.\d+)(?:[eE][+-]?\d+)?$").is_match(&canonical) {
        return None;
    }
    let mut value: f64 = canonical.parse().ok()?;
    if percent {
        value /= 100.0;
    }
    Some((value, percent))
}

/// Rewrite a locale-spelled number into canonical '.'-decimal form,
/// validating digit grouping. Returns None if the spelling is not a
/// well-formed number under this locale.
fn canonicalize_number(s: &str, locale: &Locale) -> Option<String> {
    let (sign, body) = match s.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", s.strip_prefix('+').unwrap_or(s)),
    };
    if body.is_empty() {
        return None;
    }

    // Split off a scientific exponent; separators never appear inside it
    let (mantissa, exponent) = match body.find(['e', 'E']) {
        Some(pos) => (&body[..pos], Some(&body[pos..])),
        None => (body, None),
    };

    let mut parts = mantissa.split(locale.decimal_separator);
    let int_part = parts.next()?;
    let frac_part = parts.next();
    if parts.next().is_some() {
        return None; // more than one decimal separator
    }
    if let Some(frac) = frac_part {
        if frac.contains(locale.group_separator) {
            return None;
        }
    }

    let int_digits = if int_part.contains(locale.group_separator) {
        let groups: Vec<&str> = int_part.split(locale.group_separator).collect();
        let mut iter = groups.iter();
        let first = iter.next()?;
        if first.is_empty() || first.len() > 3 || !first.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        for group in iter {
            if group.len() != 3 || !group.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
        }
        groups.concat()
    } else {
        int_part.to_string()
    };

    let mut out = String::with_capacity(s.len());
    out.push_str(sign);
    out.push_str(&int_digits);
    if let Some(frac) = frac_part {
        out.push('.');
        out.push_str(frac);
    }
    if let Some(exp) = exponent {
        out.push_str(exp);
    }
    Some(out)
}

// === Display formatting ===

/// Format a value for display per a number format and locale.
pub fn format_value(value: &CellValue, format: &NumberFormat, locale: &Locale) -> String {
    match value.effective() {
        CellValue::Empty => String::new(),
        CellValue::Boolean(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
        CellValue::Error(e) => e.to_string(),
        CellValue::String(s) => format_text(s.as_str(), format),
        CellValue::Number(n) => format_number(*n, format, locale),
        // Uncalculated formulas surface their source text
        CellValue::Formula { text, .. } => text.clone(),
    }
}

fn format_text(text: &str, format: &NumberFormat) -> String {
    let spec = format.format_string();
    // The last ';'-separated section containing '@' formats text
    if let Some(section) = spec.split(';').find(|s| s.contains('@')) {
        let mut out = String::new();
        let mut chars = section.chars();
        while let Some(c) = chars.next() {
            match c {
                '@' => out.push_str(text),
                '"' => {
                    for lit in chars.by_ref() {
                        if lit == '"' {
                            break;
                        }
                        out.push(lit);
                    }
                }
                other => out.push(other),
            }
        }
        out
    } else {
        text.to_string()
    }
}

fn format_number(n: f64, format: &NumberFormat, locale: &Locale) -> String {
    match format {
        NumberFormat::General => format_general(n, locale),
        NumberFormat::Custom(spec) => {
            if format.is_date_format() {
                return format_date(n, spec).unwrap_or_else(|| CellError::Value.to_string());
            }
            let sections: Vec<&str> = spec.split(';').collect();
            let (section, magnitude) = if n < 0.0 && sections.len() > 1 {
                (sections[1], -n)
            } else {
                (sections[0], n.abs())
            };
            let negative_with_single_section = n < 0.0 && sections.len() == 1;
            let rendered = render_numeric_section(magnitude, section, locale);
            if negative_with_single_section {
                format!("-{}", rendered)
            } else {
                rendered
            }
        }
    }
}

/// General rendering: shortest faithful form, locale decimal separator.
fn format_general(n: f64, locale: &Locale) -> String {
    let text = if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    };
    if locale.decimal_separator != '.' {
        text.replace('.', &locale.decimal_separator.to_string())
    } else {
        text
    }
}

/// Render a serial number through a date pattern (yyyy/yy/mm/m/dd/d).
fn format_date(serial: f64, pattern: &str) -> Option<String> {
    let date = serial_to_date(serial)?;
    let mut out = String::new();
    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i].to_ascii_lowercase();
        let run = chars[i..]
            .iter()
            .take_while(|&&x| x.to_ascii_lowercase() == c)
            .count();
        match c {
            'y' => {
                if run >= 4 {
                    out.push_str(&format!("{:04}", date.year()));
                } else {
                    out.push_str(&format!("{:02}", date.year() % 100));
                }
            }
            'm' => {
                if run >= 2 {
                    out.push_str(&format!("{:02}", date.month()));
                } else {
                    out.push_str(&date.month().to_string());
                }
            }
            'd' => {
                if run >= 2 {
                    out.push_str(&format!("{:02}", date.day()));
                } else {
                    out.push_str(&date.day().to_string());
                }
            }
            _ => {
                for _ in 0..run {
                    out.push(chars[i]);
                }
            }
        }
        i += run;
    }
    Some(out)
}

/// One parsed numeric format section
#[derive(Debug, Default)]
struct NumericSpec {
    prefix: String,
    suffix: String,
    decimals: usize,
    min_int_digits: usize,
    grouping: bool,
    percent: bool,
    scientific: bool,
}

fn parse_numeric_section(section: &str) -> NumericSpec {
    let mut spec = NumericSpec::default();
    let mut seen_digits = false;
    let mut in_decimals = false;
    let chars: Vec<char> = section.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '0' | '#' => {
                seen_digits = true;
                if in_decimals {
                    spec.decimals += 1;
                } else if chars[i] == '0' {
                    spec.min_int_digits += 1;
                }
            }
            '.' => in_decimals = true,
            ',' => {
                if seen_digits && !in_decimals {
                    spec.grouping = true;
                }
            }
            '%' => {
                spec.percent = true;
                if seen_digits {
                    spec.suffix.push('%');
                } else {
                    spec.prefix.push('%');
                }
            }
            'E' | 'e' => {
                // Scientific marker: E+00 / E-00; trailing zeros set the
                // exponent width implicitly (always rendered 2 wide)
                if chars.get(i + 1) == Some(&'+') || chars.get(i + 1) == Some(&'-') {
                    spec.scientific = true;
                    i += 1;
                    while chars.get(i + 1) == Some(&'0') {
                        i += 1;
                    }
                }
            }
            '"' => {
                let mut lit = String::new();
                i += 1;
                while i < chars.len() && chars[i] != '"' {
                    lit.push(chars[i]);
                    i += 1;
                }
                if seen_digits {
                    spec.suffix.push_str(&lit);
                } else {
                    spec.prefix.push_str(&lit);
                }
            }
            other => {
                if seen_digits {
                    spec.suffix.push(other);
                } else {
                    spec.prefix.push(other);
                }
            }
        }
        i += 1;
    }
    spec
}

fn render_numeric_section(magnitude: f64, section: &str, locale: &Locale) -> String {
    let spec = parse_numeric_section(section);

    let body = if spec.scientific {
        render_scientific(magnitude, spec.decimals, locale)
    } else {
        let scaled = if spec.percent { magnitude * 100.0 } else { magnitude };
        render_fixed(scaled, &spec, locale)
    };

    format!("{}{}{}", spec.prefix, body, spec.suffix)
}

fn render_fixed(value: f64, spec: &NumericSpec, locale: &Locale) -> String {
    let text = match Decimal::from_f64_retain(value) {
        Some(d) => d
            .round_dp_with_strategy(spec.decimals as u32, RoundingStrategy::MidpointAwayFromZero)
            .to_string(),
        // Out of Decimal's range: fall back to std formatting
        None => format!("{:.*}", spec.decimals, value),
    };

    let (int_part, frac_part) = match text.split_once('.') {
        Some((i, f)) => (i.to_string(), f.to_string()),
        None => (text, String::new()),
    };

    let mut int_digits = int_part.trim_start_matches('-').to_string();
    while int_digits.len() < spec.min_int_digits.max(1) {
        int_digits.insert(0, '0');
    }
    if spec.grouping {
        int_digits = group_digits(&int_digits, locale.group_separator);
    }

    let mut out = int_digits;
    if spec.decimals > 0 {
        let mut frac = frac_part;
        while frac.len() < spec.decimals {
            frac.push('0');
        }
        out.push(locale.decimal_separator);
        out.push_str(&frac);
    }
    out
}

fn group_digits(digits: &str, separator: char) -> String {
    let bytes = digits.as_bytes();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, &b) in bytes.iter().enumerate() {
        let remaining = bytes.len() - i;
        if i > 0 && remaining % 3 == 0 {
            out.push(separator);
        }
        out.push(b as char);
    }
    out
}

fn render_scientific(magnitude: f64, decimals: usize, locale: &Locale) -> String {
    if magnitude == 0.0 {
        let zero = render_fixed(0.0, &NumericSpec { decimals, ..Default::default() }, locale);
        return format!("{}E+00", zero);
    }
    let exponent = magnitude.abs().log10().floor() as i32;
    let mantissa = magnitude / 10f64.powi(exponent);
    let spec = NumericSpec {
        decimals,
        ..Default::default()
    };
    let sign = if exponent < 0 { '-' } else { '+' };
    format!(
        "{}E{}{:02}",
        render_fixed(mantissa, &spec, locale),
        sign,
        exponent.abs()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse_num(text: &str, locale: &Locale) -> Option<f64> {
        match parse_user_input(text, locale).value {
            CellValue::Number(n) => Some(n),
            _ => None,
        }
    }

    #[test]
    fn parses_plain_numbers() {
        let us = Locale::en_us();
        assert_eq!(parse_num("42", &us), Some(42.0));
        assert_eq!(parse_num("-3.5", &us), Some(-3.5));
        assert_eq!(parse_num("+0.25", &us), Some(0.25));
        assert_eq!(parse_num("1.5e3", &us), Some(1500.0));
        assert_eq!(parse_num("2E-2", &us), Some(0.02));
    }

    #[test]
    fn decimal_separator_is_locale_sensitive() {
        // "4,3" is 4.3 under a comma-decimal locale
        let de = Locale::de_de();
        assert_eq!(parse_num("4,3", &de), Some(4.3));

        // ...and stays text under en-US (a lone comma is not valid grouping)
        let us = Locale::en_us();
        let parsed = parse_user_input("4,3", &us);
        assert_eq!(parsed.value.as_str(), Some("4,3"));
    }

    #[test]
    fn group_separators_must_form_triples() {
        let us = Locale::en_us();
        assert_eq!(parse_num("1,234", &us), Some(1234.0));
        assert_eq!(parse_num("1,234,567.5", &us), Some(1234567.5));
        assert!(parse_num("12,34", &us).is_none());
        assert!(parse_num("1,2345", &us).is_none());

        let de = Locale::de_de();
        assert_eq!(parse_num("1.234,5", &de), Some(1234.5));
    }

    #[test]
    fn percent_suffix_scales_and_suggests_format() {
        let us = Locale::en_us();
        let parsed = parse_user_input("50%", &us);
        assert_eq!(parsed.value, CellValue::Number(0.5));
        assert_eq!(parsed.suggested_format, Some(NumberFormat::percent()));
    }

    #[test]
    fn numeric_prefix_with_garbage_stays_text() {
        let us = Locale::en_us();
        for text in ["3rd", "12abc", "1.2.3", "5 apples", "--2"] {
            let parsed = parse_user_input(text, &us);
            assert_eq!(parsed.value.as_str(), Some(text), "should stay text: {:?}", text);
        }
    }

    #[test]
    fn booleans_and_forced_text() {
        let us = Locale::en_us();
        assert_eq!(parse_user_input("true", &us).value, CellValue::Boolean(true));
        assert_eq!(parse_user_input("FALSE", &us).value, CellValue::Boolean(false));

        // A leading apostrophe forces text, apostrophe stripped
        let parsed = parse_user_input("'123", &us);
        assert_eq!(parsed.value.as_str(), Some("123"));
    }

    #[test]
    fn date_literals_follow_locale_order() {
        let us = Locale::en_us();
        let de = Locale::de_de();
        let iso = Locale::iso();

        let expected = date_to_serial(NaiveDate::from_ymd_opt(2024, 3, 14).unwrap());
        assert_eq!(parse_num("3/14/2024", &us), Some(expected));
        assert_eq!(parse_num("14.3.2024", &de), Some(expected));
        assert_eq!(parse_num("2024-3-14", &iso), Some(expected));

        // Two-digit years pivot at 70
        let y2030 = parse_num("3/14/30", &us).unwrap();
        assert_eq!(serial_to_date(y2030).unwrap().year(), 2030);
        let y1985 = parse_num("3/14/85", &us).unwrap();
        assert_eq!(serial_to_date(y1985).unwrap().year(), 1985);

        // Invalid calendar dates fall through to text
        assert!(parse_num("13/40/2024", &us).is_none());
    }

    #[test]
    fn date_parse_suggests_date_format() {
        let us = Locale::en_us();
        let parsed = parse_user_input("3/14/2024", &us);
        assert_eq!(parsed.suggested_format, Some(us.date_format()));
    }

    #[test]
    fn general_formatting() {
        let us = Locale::en_us();
        assert_eq!(format_value(&CellValue::Number(42.0), &NumberFormat::General, &us), "42");
        assert_eq!(format_value(&CellValue::Number(4.25), &NumberFormat::General, &us), "4.25");

        let de = Locale::de_de();
        assert_eq!(format_value(&CellValue::Number(4.25), &NumberFormat::General, &de), "4,25");
    }

    #[test]
    fn fixed_and_grouped_formats() {
        let us = Locale::en_us();
        let decimal = NumberFormat::decimal();
        assert_eq!(format_value(&CellValue::Number(3.0), &decimal, &us), "3.00");
        assert_eq!(format_value(&CellValue::Number(0.125), &decimal, &us), "0.13");
        assert_eq!(format_value(&CellValue::Number(-7.5), &decimal, &us), "-7.50");

        let grouped = NumberFormat::thousands_decimal();
        assert_eq!(
            format_value(&CellValue::Number(1234567.891), &grouped, &us),
            "1,234,567.89"
        );

        let de = Locale::de_de();
        assert_eq!(
            format_value(&CellValue::Number(1234567.891), &grouped, &de),
            "1.234.567,89"
        );
    }

    #[test]
    fn percent_and_scientific_formats() {
        let us = Locale::en_us();
        assert_eq!(
            format_value(&CellValue::Number(0.5), &NumberFormat::percent(), &us),
            "50%"
        );
        assert_eq!(
            format_value(&CellValue::Number(0.1234), &NumberFormat::Custom("0.0%".into()), &us),
            "12.3%"
        );
        assert_eq!(
            format_value(&CellValue::Number(12345.0), &NumberFormat::scientific(), &us),
            "1.23E+04"
        );
        assert_eq!(
            format_value(&CellValue::Number(0.00123), &NumberFormat::scientific(), &us),
            "1.23E-03"
        );
    }

    #[test]
    fn accounting_negative_section() {
        let us = Locale::en_us();
        let accounting = NumberFormat::accounting();
        assert_eq!(
            format_value(&CellValue::Number(-1234.5), &accounting, &us),
            "(1,234.50)"
        );
        assert_eq!(
            format_value(&CellValue::Number(1234.5), &accounting, &us),
            "1,234.50"
        );
    }

    #[test]
    fn text_passthrough_and_literals() {
        let us = Locale::en_us();
        let fmt = NumberFormat::Custom("\"Item: \"@".into());
        assert_eq!(
            format_value(&CellValue::string("bolt"), &fmt, &us),
            "Item: bolt"
        );
        assert_eq!(
            format_value(&CellValue::string("plain"), &NumberFormat::General, &us),
            "plain"
        );

        let suffixed = NumberFormat::Custom("0.0\" kg\"".into());
        assert_eq!(
            format_value(&CellValue::Number(2.5), &suffixed, &us),
            "2.5 kg"
        );
    }

    #[test]
    fn date_rendering() {
        let us = Locale::en_us();
        let serial = date_to_serial(NaiveDate::from_ymd_opt(2024, 3, 9).unwrap());
        assert_eq!(
            format_value(&CellValue::Number(serial), &NumberFormat::date_iso(), &us),
            "2024-03-09"
        );
        assert_eq!(
            format_value(&CellValue::Number(serial), &NumberFormat::Custom("m/d/yy".into()), &us),
            "3/9/24"
        );
    }

    #[test]
    fn round_trip_numbers_and_dates() {
        for locale in [Locale::en_us(), Locale::de_de()] {
            for n in [0.0, 1.0, -2.5, 0.1, 1234.5678, 1e10, -0.001] {
                let rendered = format_value(&CellValue::Number(n), &NumberFormat::General, &locale);
                assert_eq!(parse_num(&rendered, &locale), Some(n), "locale round-trip of {}", n);
            }
        }

        // Date round-trip through the locale's own short-date format
        let us = Locale::en_us();
        let serial = date_to_serial(NaiveDate::from_ymd_opt(2031, 12, 3).unwrap());
        let rendered = format_value(&CellValue::Number(serial), &us.date_format(), &us);
        assert_eq!(parse_num(&rendered, &us), Some(serial));
    }

    #[test]
    fn errors_render_their_tokens() {
        let us = Locale::en_us();
        assert_eq!(
            format_value(&CellValue::Error(CellError::Div0), &NumberFormat::General, &us),
            "#DIV/0!"
        );
    }
}
