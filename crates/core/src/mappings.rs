//! Normalisation tables for VistA clinical text.
//!
//! Every table is built on first use and is read-only afterwards. The public functions are pure
//! and take raw VistA strings in any case.

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Which status vocabulary [`validate_status`] should apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusDomain {
    Medication,
    Consult,
}

impl StatusDomain {
    fn fallback(self) -> &'static str {
        match self {
            StatusDomain::Medication => "ACTIVE",
            StatusDomain::Consult => "PENDING",
        }
    }

    fn table(self) -> &'static HashMap<&'static str, &'static str> {
        match self {
            StatusDomain::Medication => &MEDICATION_STATUS,
            StatusDomain::Consult => &CONSULT_STATUS,
        }
    }
}

type PatternTable = Vec<(Regex, &'static str)>;

fn pattern(regex_str: &str, value: &'static str) -> (Regex, &'static str) {
    (
        Regex::new(regex_str).expect("invalid mapping pattern"),
        value,
    )
}

static FREQUENCY_NORMALIZATION: LazyLock<HashMap<&'static str, &'static str>> =
    LazyLock::new(|| {
        HashMap::from([
            ("QD", "once daily"),
            ("DAILY", "once daily"),
            ("ONCE DAILY", "once daily"),
            ("EVERY DAY", "once daily"),
            ("Q24H", "once daily"),
            ("BID", "twice daily"),
            ("TWICE DAILY", "twice daily"),
            ("TWICE A DAY", "twice daily"),
            ("Q12H", "twice daily"),
            ("TID", "three times daily"),
            ("THREE TIMES DAILY", "three times daily"),
            ("Q8H", "three times daily"),
            ("QID", "four times daily"),
            ("FOUR TIMES DAILY", "four times daily"),
            ("Q6H", "four times daily"),
            ("Q4H", "every 4 hours"),
            ("QHS", "at bedtime"),
            ("HS", "at bedtime"),
            ("QAM", "every morning"),
            ("QPM", "every evening"),
            ("QOD", "every other day"),
            ("QW", "once weekly"),
            ("WEEKLY", "once weekly"),
            ("PRN", "as needed"),
            ("AS NEEDED", "as needed"),
            ("STAT", "immediately"),
            ("ONCE", "once"),
        ])
    });

static EVERY_N_HOURS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"EVERY\s+(\d+)\s+HOURS?").expect("invalid hours pattern"));
static TIMES_PER_DAY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+)\s+TIMES?\s+(?:A\s+|PER\s+)?DAY").expect("invalid daily pattern")
});
static TIMES_PER_WEEK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+)\s+TIMES?\s+(?:A\s+|PER\s+)?WEEK").expect("invalid weekly pattern")
});

static MEDICATION_STATUS: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    HashMap::from([
        ("A", "ACTIVE"),
        ("ACTIVE", "ACTIVE"),
        ("D", "DISCONTINUED"),
        ("DC", "DISCONTINUED"),
        ("DISCONTINUED", "DISCONTINUED"),
        ("STOPPED", "DISCONTINUED"),
        ("E", "EXPIRED"),
        ("EXPIRED", "EXPIRED"),
        ("H", "HOLD"),
        ("HOLD", "HOLD"),
        ("S", "SUSPENDED"),
        ("SUSPENDED", "SUSPENDED"),
        ("P", "PENDING"),
        ("PENDING", "PENDING"),
        ("C", "COMPLETED"),
        ("COMPLETE", "COMPLETED"),
        ("COMPLETED", "COMPLETED"),
    ])
});

static CONSULT_STATUS: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    HashMap::from([
        ("P", "PENDING"),
        ("PENDING", "PENDING"),
        ("S", "SCHEDULED"),
        ("SCHEDULED", "SCHEDULED"),
        ("A", "ACTIVE"),
        ("ACTIVE", "ACTIVE"),
        ("C", "COMPLETED"),
        ("COMPLETE", "COMPLETED"),
        ("COMPLETED", "COMPLETED"),
        ("X", "CANCELLED"),
        ("CANCELLED", "CANCELLED"),
        ("DC", "DISCONTINUED"),
        ("DISCONTINUED", "DISCONTINUED"),
    ])
});

// Ordered: the first matching pattern wins.
static SIG_FREQUENCY_PATTERNS: LazyLock<PatternTable> = LazyLock::new(|| {
    vec![
        pattern(r"\bTWICE\s+(?:A\s+|PER\s+)?DAY\b|\bTWICE\s+DAILY\b|\bBID\b|EVERY\s+12\s+HOURS", "BID"),
        pattern(r"\bTHREE\s+TIMES\s+(?:A\s+|PER\s+)?(?:DAY|DAILY)\b|\bTID\b|EVERY\s+8\s+HOURS", "TID"),
        pattern(r"\bFOUR\s+TIMES\s+(?:A\s+|PER\s+)?(?:DAY|DAILY)\b|\bQID\b|EVERY\s+6\s+HOURS", "QID"),
        pattern(r"\bAT\s+BEDTIME\b|\bQHS\b", "QHS"),
        pattern(r"\bONCE\s+(?:A\s+|PER\s+)?(?:DAY|DAILY)\b|\bEVERY\s+DAY\b|\bDAILY\b|\bQD\b", "QD"),
        pattern(r"\bWEEKLY\b|\bONCE\s+A\s+WEEK\b", "QW"),
        pattern(r"\bAS\s+NEEDED\b|\bPRN\b", "PRN"),
    ]
});

// Subcutaneous comes before the generic injection rule so "INJECT ... SUBCUTANEOUS" is SQ.
static ROUTE_PATTERNS: LazyLock<PatternTable> = LazyLock::new(|| {
    vec![
        pattern(r"\bBY\s+MOUTH\b|\bORALLY\b|\bPO\b", "PO"),
        pattern(r"SUBCUTANEOUS|\bSUBQ\b|\bSQ\b", "SQ"),
        pattern(r"INTRAVENOUS|\bIV\b", "IV"),
        pattern(r"INTRAMUSCULAR|\bIM\b|\bINJECT", "IM"),
        pattern(r"SUBLINGUAL|UNDER\s+THE\s+TONGUE|\bSL\b", "SL"),
        pattern(r"TOPICAL|\bAPPLY\b|AFFECTED\s+AREA", "TOP"),
        pattern(r"\bINHALE|INHALATION|\bPUFFS?\b", "INH"),
        pattern(r"TRANSDERMAL|\bPATCH\b", "TD"),
        pattern(r"RECTAL|\bPR\b", "PR"),
        pattern(r"OPHTHALMIC|\bEYES?\b", "OPH"),
        pattern(r"\bNASAL|NOSTRIL", "NAS"),
    ]
});

static TIMING_PATTERNS: LazyLock<PatternTable> = LazyLock::new(|| {
    vec![
        pattern(r"\bWITH\s+(?:MEALS?|FOOD)\b", "with meals"),
        pattern(r"\bBEFORE\s+MEALS?\b", "before meals"),
        pattern(r"\bAFTER\s+MEALS?\b", "after meals"),
        pattern(r"\bAT\s+BEDTIME\b|\bQHS\b", "at bedtime"),
        pattern(r"\bIN\s+THE\s+MORNING\b|\bQAM\b", "in morning"),
        pattern(r"\bIN\s+THE\s+EVENING\b|\bQPM\b", "in evening"),
        pattern(r"\bON\s+AN\s+EMPTY\s+STOMACH\b", "on empty stomach"),
    ]
});

static SPECIAL_INSTRUCTION_PATTERNS: LazyLock<PatternTable> = LazyLock::new(|| {
    vec![
        pattern(r"\bAS\s+NEEDED\b|\bPRN\b", "as_needed"),
        pattern(r"\bDO\s+NOT\s+CRUSH\b", "do_not_crush"),
        pattern(r"\bDO\s+NOT\s+CHEW\b", "do_not_chew"),
        pattern(r"\bWITH\s+(?:PLENTY\s+OF\s+|A\s+FULL\s+GLASS\s+OF\s+)?WATER\b", "with_water"),
        pattern(r"\bWITH\s+(?:MEALS?|FOOD)\b", "with_food"),
        pattern(r"\bSHAKE\s+WELL\b", "shake_well"),
        pattern(r"\bAVOID\s+ALCOHOL\b", "avoid_alcohol"),
        pattern(r"\bMAY\s+CAUSE\s+DROWSINESS\b", "may_cause_drowsiness"),
    ]
});

static SPECIMEN_MAPPINGS: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    HashMap::from([
        ("SER", "SERUM"),
        ("PLM", "PLASMA"),
        ("PLAS", "PLASMA"),
        ("SER/PLAS", "SERUM/PLASMA"),
        ("BLD", "WHOLE BLOOD"),
        ("WB", "WHOLE BLOOD"),
        ("BLOOD", "WHOLE BLOOD"),
        ("UR", "URINE"),
        ("URN", "URINE"),
        ("CSF", "CEREBROSPINAL FLUID"),
        ("ART BLD", "ARTERIAL BLOOD"),
    ])
});

const INVALID_SPECIMENS: &[&str] = &["N/A", "NA", "NONE", "NULL", "UNKNOWN", "-"];

static ABNORMAL_FLAGS: LazyLock<HashMap<&'static str, &'static str>> = LazyLock::new(|| {
    HashMap::from([
        ("H", "HIGH"),
        ("L", "LOW"),
        ("HH", "CRITICALLY HIGH"),
        ("LL", "CRITICALLY LOW"),
        ("*H", "CRITICALLY HIGH"),
        ("*L", "CRITICALLY LOW"),
        ("A", "ABNORMAL"),
        ("AA", "CRITICALLY ABNORMAL"),
        ("N", "NORMAL"),
    ])
});

/// Dosage forms recognised in VistA product names.
pub const MEDICATION_FORMS: &[&str] = &[
    "TAB", "TABLET", "CAP", "CAPSULE", "SOLN", "SOLUTION", "SUSP", "SUSPENSION", "SYRUP",
    "ELIXIR", "INJ", "INJECTION", "CREAM", "OINT", "OINTMENT", "GEL", "LOTION", "PATCH",
    "INHALER", "SPRAY", "DROPS", "SUPP", "SUPPOSITORY", "POWDER",
];

fn first_match(table: &PatternTable, text: &str) -> Option<&'static str> {
    if text.trim().is_empty() {
        return None;
    }
    let upper = text.to_uppercase();
    table
        .iter()
        .find(|(regex, _)| regex.is_match(&upper))
        .map(|(_, value)| *value)
}

fn named_count(count: u32, names: &[&str], unit: &str) -> String {
    match count
        .checked_sub(1)
        .and_then(|index| names.get(index as usize))
    {
        Some(name) => format!("{name} {unit}"),
        None => format!("{count} times {unit}"),
    }
}

/// Normalise a medication frequency to plain English.
///
/// Exact table matches win, then the "every N hours" and "N times a day/week" rules. Anything
/// else, whitespace-only input included, is returned lower-cased. Only empty input is
/// "as directed".
pub fn normalize_frequency(raw: &str) -> String {
    if raw.is_empty() {
        return "as directed".to_owned();
    }
    let upper = raw.trim().to_uppercase();
    if let Some(normalized) = FREQUENCY_NORMALIZATION.get(upper.as_str()) {
        return (*normalized).to_owned();
    }

    if let Some(hours) = capture_number(&EVERY_N_HOURS, &upper) {
        return match hours {
            24 => "once daily".to_owned(),
            12 => "twice daily".to_owned(),
            8 => "three times daily".to_owned(),
            6 => "four times daily".to_owned(),
            other => format!("every {other} hours"),
        };
    }
    if let Some(times) = capture_number(&TIMES_PER_DAY, &upper) {
        return named_count(times, &["once", "twice", "three times", "four times"], "daily");
    }
    if let Some(times) = capture_number(&TIMES_PER_WEEK, &upper) {
        return named_count(times, &["once", "twice", "three times"], "weekly");
    }

    raw.to_lowercase()
}

fn capture_number(regex: &Regex, text: &str) -> Option<u32> {
    regex
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Map a raw status code onto the vocabulary of `domain`.
///
/// Unknown or empty input yields `ACTIVE` for medications and `PENDING` otherwise.
pub fn validate_status(raw: &str, domain: StatusDomain) -> &'static str {
    let upper = raw.trim().to_uppercase();
    domain
        .table()
        .get(upper.as_str())
        .copied()
        .unwrap_or_else(|| domain.fallback())
}

/// Frequency code (`BID`, `QD`, `PRN`, ...) named in a sig, if any.
pub fn extract_frequency_from_sig(sig: &str) -> Option<&'static str> {
    first_match(&SIG_FREQUENCY_PATTERNS, sig)
}

/// Route code (`PO`, `SQ`, `IM`, ...) named in a sig, if any.
pub fn extract_route(sig: &str) -> Option<&'static str> {
    first_match(&ROUTE_PATTERNS, sig)
}

pub fn extract_timing(sig: &str) -> Option<&'static str> {
    first_match(&TIMING_PATTERNS, sig)
}

/// Every special-instruction flag present in a sig, in table order.
pub fn extract_special_instructions(sig: &str) -> Vec<&'static str> {
    if sig.trim().is_empty() {
        return Vec::new();
    }
    let upper = sig.to_uppercase();
    SPECIAL_INSTRUCTION_PATTERNS
        .iter()
        .filter(|(regex, _)| regex.is_match(&upper))
        .map(|(_, flag)| *flag)
        .collect()
}

/// Standardise a lab specimen name. Placeholder values such as `N/A` yield `None`.
pub fn clean_specimen_type(raw: &str) -> Option<String> {
    let cleaned = raw.trim().to_uppercase();
    if cleaned.is_empty() || INVALID_SPECIMENS.contains(&cleaned.as_str()) {
        return None;
    }
    Some(
        SPECIMEN_MAPPINGS
            .get(cleaned.as_str())
            .map(|mapped| (*mapped).to_owned())
            .unwrap_or(cleaned),
    )
}

pub fn abnormal_flag_meaning(flag: &str) -> Option<&'static str> {
    ABNORMAL_FLAGS.get(flag.trim().to_uppercase().as_str()).copied()
}

pub fn is_medication_form(word: &str) -> bool {
    MEDICATION_FORMS.contains(&word.trim().to_uppercase().as_str())
}
