//! Mathematical content detection, recovery, and normalization.
//!
//! PDF extraction frequently mangles Mathematical Alphanumeric Symbols
//! (SMP plane, U+1D400..U+1D7FF): a broken surrogate pair drops the high
//! 0x10000 bit and leaves a Hangul syllable in U+D400..U+D7FF sitting in
//! the middle of an equation. `recover` restores the intended symbol,
//! `clean` folds the whole SMP alphabet back to plain ASCII/Greek, and
//! `searchable` additionally expands Greek letters to their names so that
//! lexical scoring can match "alpha decay" against "α decay".

use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

static LATEX_BRACE_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\\[a-zA-Z]+\*?\{([^{}]*)\}").expect("latex brace regex is valid")
});
static LATEX_BARE_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\\[a-zA-Z]+\*?").expect("latex bare regex is valid")
});
static EQUATION_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"[A-Za-z][A-Za-z0-9_]*\s*=\s*[A-Za-z0-9(]").expect("equation regex is valid")
});
static FUNCTION_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\b[a-zA-Z]\s*\(\s*[a-zA-Z][a-zA-Z0-9,\s]*\)").expect("function regex is valid")
});
static SUBSCRIPT_VAR_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\b[a-zA-Z]_\{?[a-zA-Z0-9]").expect("subscript var regex is valid")
});
static LIMIT_FORM_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\b(lim|max|min|sup|inf|argmax|argmin)\b").expect("limit form regex is valid")
});
static STATISTICAL_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\b(E|P|Var|Cov)\s*[\[(]").expect("statistical form regex is valid")
});
static SPACE_RUN_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"[ \t]{2,}").expect("space run regex is valid")
});
static NEWLINE_RUN_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\n{3,}").expect("newline run regex is valid")
});
static SPACE_BEFORE_PUNCT_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r" +([,.;:!?)])").expect("punct spacing regex is valid")
});
static SPACE_AFTER_OPEN_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(r"\( +").expect("open paren spacing regex is valid")
});

/// Garbled-SMP range: a Mathematical Alphanumeric Symbol with the high
/// 0x10000 bit dropped lands here, inside the Hangul syllable block.
const GARBLED_LO: u32 = 0xD400;
const GARBLED_HI: u32 = 0xD7FF;
const SMP_LO: u32 = 0x1D400;
const SMP_HI: u32 = 0x1D7FF;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MathType {
    Greek,
    SymbolAlphabet,
    Operator,
    Script,
    Latex,
    Equation,
    Statistical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MathAnalysis {
    pub has_math: bool,
    pub math_score: f32,
    pub math_types: Vec<MathType>,
    pub has_extraction_issues: bool,
}

pub struct MathHandler;

impl MathHandler {
    /// Detect mathematical content and extraction damage in a chunk.
    pub fn analyze(text: &str) -> MathAnalysis {
        let chars: Vec<char> = text.chars().collect();
        let len = chars.len().max(1);

        let mut greek = 0usize;
        let mut smp = 0usize;
        let mut operators = 0usize;
        let mut scripts = 0usize;

        for &c in &chars {
            let cp = c as u32;
            if is_greek_letter(c) {
                greek += 1;
            } else if (SMP_LO..=SMP_HI).contains(&cp) || is_garbled(c) {
                smp += 1;
            } else if is_math_operator(c) {
                operators += 1;
            } else if is_super_or_subscript(c) {
                scripts += 1;
            }
        }

        let latex = LATEX_BARE_RE.find_iter(text).count();
        let equations = EQUATION_RE.find_iter(text).count()
            + FUNCTION_RE.find_iter(text).count()
            + SUBSCRIPT_VAR_RE.find_iter(text).count()
            + LIMIT_FORM_RE.find_iter(text).count();
        let statistical = STATISTICAL_RE.find_iter(text).count();

        let mut math_types = Vec::new();
        if greek > 0 {
            math_types.push(MathType::Greek);
        }
        if smp > 0 {
            math_types.push(MathType::SymbolAlphabet);
        }
        if operators > 0 {
            math_types.push(MathType::Operator);
        }
        if scripts > 0 {
            math_types.push(MathType::Script);
        }
        if latex > 0 {
            math_types.push(MathType::Latex);
        }
        if equations > 0 {
            math_types.push(MathType::Equation);
        }
        if statistical > 0 {
            math_types.push(MathType::Statistical);
        }

        let weighted = greek as f32
            + smp as f32
            + operators as f32
            + scripts as f32 * 0.5
            + latex as f32 * 2.0
            + equations as f32 * 2.0
            + statistical as f32 * 2.0;
        let math_score = (weighted / (0.1 * len as f32)).min(1.0);
        let has_math = math_score > 0.05 || math_types.len() >= 2;

        MathAnalysis {
            has_math,
            math_score,
            math_types,
            has_extraction_issues: has_garbled_math(&chars),
        }
    }

    /// Restore garbled Mathematical Alphanumeric Symbols: each Hangul in
    /// the U+D400..U+D7FF window is the low half of a lost surrogate pair
    /// and recovers as codepoint + 0x10000.
    pub fn recover(text: &str) -> String {
        text.chars()
            .map(|c| {
                if is_garbled(c) {
                    char::from_u32(c as u32 + 0x10000).unwrap_or(c)
                } else {
                    c
                }
            })
            .collect()
    }

    /// Normalize math-bearing text: recover garbled symbols, fold the SMP
    /// alphabets to ASCII/Greek, replace ligatures and smart punctuation,
    /// strip orphan LaTeX (keeping brace contents), and tidy whitespace.
    pub fn clean(text: &str) -> String {
        let recovered = if has_garbled_math(&text.chars().collect::<Vec<_>>()) {
            Self::recover(text)
        } else {
            text.to_string()
        };

        let mut out = String::with_capacity(recovered.len());
        for c in recovered.chars() {
            match smp_to_plain(c) {
                Some(mapped) => out.push_str(&mapped),
                None => match ligature_or_punct(c) {
                    Some(replacement) => out.push_str(replacement),
                    None => out.push(c),
                },
            }
        }

        // Strip LaTeX commands, preserving brace contents. Nested braces
        // resolve across passes; three passes cover real documents.
        for _ in 0..3 {
            if !LATEX_BRACE_RE.is_match(&out) {
                break;
            }
            out = LATEX_BRACE_RE.replace_all(&out, "$1").into_owned();
        }
        out = LATEX_BARE_RE.replace_all(&out, "").into_owned();

        let out = SPACE_RUN_RE.replace_all(&out, " ");
        let out = NEWLINE_RUN_RE.replace_all(&out, "\n\n");
        let out = SPACE_BEFORE_PUNCT_RE.replace_all(&out, "$1");
        let out = SPACE_AFTER_OPEN_RE.replace_all(&out, "(");
        out.trim().to_string()
    }

    /// Lexically searchable form: `clean` plus Greek letters expanded to
    /// their ASCII names and super/subscripts flattened to plain digits.
    pub fn searchable(text: &str) -> String {
        let cleaned = Self::clean(text);
        let mut out = String::with_capacity(cleaned.len());
        for c in cleaned.chars() {
            if let Some(name) = greek_name(c) {
                out.push_str(name);
            } else if let Some(plain) = script_to_ascii(c) {
                out.push(plain);
            } else {
                out.push(c);
            }
        }
        out
    }
}

fn is_garbled(c: char) -> bool {
    (GARBLED_LO..=GARBLED_HI).contains(&(c as u32))
}

fn is_greek_letter(c: char) -> bool {
    matches!(c as u32, 0x0391..=0x03A9 | 0x03B1..=0x03C9 | 0x03D0..=0x03F5)
}

fn is_math_operator(c: char) -> bool {
    // Mathematical Operators block plus the arrows used in equations.
    matches!(c as u32, 0x2200..=0x22FF | 0x2190..=0x2194 | 0x27E8 | 0x27E9)
}

fn is_super_or_subscript(c: char) -> bool {
    matches!(c as u32, 0x2070..=0x209C | 0x00B2 | 0x00B3 | 0x00B9)
}

/// True when a garbled Hangul sits adjacent to numerals, operators, or
/// another garbled symbol. Plain Korean prose never does this.
fn has_garbled_math(chars: &[char]) -> bool {
    for (i, &c) in chars.iter().enumerate() {
        if !is_garbled(c) {
            continue;
        }
        let lo = i.saturating_sub(2);
        let hi = (i + 3).min(chars.len());
        for (j, &n) in chars.iter().enumerate().take(hi).skip(lo) {
            if j == i {
                continue;
            }
            if n.is_ascii_digit()
                || n == '='
                || n == '+'
                || n == '-'
                || n == '/'
                || n == '^'
                || is_math_operator(n)
                || is_super_or_subscript(n)
                || is_garbled(n)
            {
                return true;
            }
        }
    }
    false
}

/// Fold one Mathematical Alphanumeric Symbol to its plain equivalent.
/// The SMP block is a grid: thirteen 52-letter Latin styles, five 58-slot
/// Greek styles, and five 10-digit runs.
fn smp_to_plain(c: char) -> Option<String> {
    let cp = c as u32;
    if !(SMP_LO..=SMP_HI).contains(&cp) {
        return None;
    }

    // Latin styles: bold, italic, ..., monospace.
    if cp <= 0x1D6A3 {
        let offset = (cp - SMP_LO) % 52;
        let plain = if offset < 26 {
            (b'A' + offset as u8) as char
        } else {
            (b'a' + (offset - 26) as u8) as char
        };
        return Some(plain.to_string());
    }

    // Dotless i and j.
    if cp == 0x1D6A4 {
        return Some("i".to_string());
    }
    if cp == 0x1D6A5 {
        return Some("j".to_string());
    }

    // Greek styles: 25 capitals (incl. ϴ), nabla, 25 smalls, partial,
    // then the six symbol variants.
    if (0x1D6A8..=0x1D7CB).contains(&cp) {
        let offset = (cp - 0x1D6A8) % 58;
        let plain = match offset {
            0..=16 => char::from_u32(0x0391 + offset)?,
            17 => 'Θ',
            18..=24 => char::from_u32(0x03A3 + (offset - 18))?,
            25 => '∇',
            26..=50 => char::from_u32(0x03B1 + (offset - 26))?,
            51 => '∂',
            52 => 'ε',
            53 => 'θ',
            54 => 'κ',
            55 => 'φ',
            56 => 'ρ',
            _ => 'π',
        };
        return Some(plain.to_string());
    }

    // Digit styles.
    if (0x1D7CE..=SMP_HI).contains(&cp) {
        let digit = (cp - 0x1D7CE) % 10;
        return Some(((b'0' + digit as u8) as char).to_string());
    }

    None
}

fn ligature_or_punct(c: char) -> Option<&'static str> {
    match c {
        '\u{FB00}' => Some("ff"),
        '\u{FB01}' => Some("fi"),
        '\u{FB02}' => Some("fl"),
        '\u{FB03}' => Some("ffi"),
        '\u{FB04}' => Some("ffl"),
        '\u{2018}' | '\u{2019}' => Some("'"),
        '\u{201C}' | '\u{201D}' => Some("\""),
        '\u{2013}' | '\u{2014}' => Some("-"),
        '\u{2026}' => Some("..."),
        '\u{00A0}' => Some(" "),
        _ => None,
    }
}

fn greek_name(c: char) -> Option<&'static str> {
    let name = match c.to_lowercase().next().unwrap_or(c) {
        'α' => "alpha",
        'β' => "beta",
        'γ' => "gamma",
        'δ' => "delta",
        'ε' | 'ϵ' => "epsilon",
        'ζ' => "zeta",
        'η' => "eta",
        'θ' | 'ϑ' => "theta",
        'ι' => "iota",
        'κ' | 'ϰ' => "kappa",
        'λ' => "lambda",
        'μ' => "mu",
        'ν' => "nu",
        'ξ' => "xi",
        'ο' => "omicron",
        'π' | 'ϖ' => "pi",
        'ρ' | 'ϱ' => "rho",
        'σ' | 'ς' => "sigma",
        'τ' => "tau",
        'υ' => "upsilon",
        'φ' | 'ϕ' => "phi",
        'χ' => "chi",
        'ψ' => "psi",
        'ω' => "omega",
        _ => return None,
    };
    Some(name)
}

fn script_to_ascii(c: char) -> Option<char> {
    let plain = match c {
        '\u{2070}' | '\u{2080}' => '0',
        '\u{00B9}' => '1',
        '\u{00B2}' => '2',
        '\u{00B3}' => '3',
        '\u{2071}' => 'i',
        '\u{2074}'..='\u{2079}' => char::from_u32('4' as u32 + (c as u32 - 0x2074))?,
        '\u{2081}'..='\u{2089}' => char::from_u32('1' as u32 + (c as u32 - 0x2081))?,
        '\u{207A}' | '\u{208A}' => '+',
        '\u{207B}' | '\u{208B}' => '-',
        '\u{207C}' | '\u{208C}' => '=',
        '\u{207D}' | '\u{208D}' => '(',
        '\u{207E}' | '\u{208E}' => ')',
        '\u{207F}' => 'n',
        _ => return None,
    };
    Some(plain)
}
