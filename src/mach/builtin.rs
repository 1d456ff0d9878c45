//! Built-in functions and statements.
//!
//! One static table drives both semantic analysis (names, arities,
//! return types) and execution. A few built-ins are overloaded on
//! arity; resolution tries an exact signature first and falls back to
//! the first entry with the name so the caller gets a type error
//! rather than an unknown-name error.

use super::platform::Platform;
use super::value::Val;
use crate::error;
use crate::lang::{ElementaryType, Error};
use chrono::Timelike;
use rand::Rng;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Num,
    Str,
}

#[derive(Debug)]
pub struct Overload {
    pub params: &'static [ParamKind],
    pub ret: Option<ElementaryType>,
}

#[derive(Debug)]
pub struct Builtin {
    pub name: &'static str,
    pub overloads: &'static [Overload],
}

use ElementaryType::{Double, Integer, Long, Single, String as Str};
use ParamKind::{Num, Str as PStr};

macro_rules! overload {
    ([$($param:expr),*] -> $ret:expr) => {
        Overload { params: &[$($param),*], ret: Some($ret) }
    };
    ([$($param:expr),*]) => {
        Overload { params: &[$($param),*], ret: None }
    };
}

pub const BUILTINS: &[Builtin] = &[
    Builtin { name: "ABS", overloads: &[overload!([Num] -> Double)] },
    Builtin { name: "ASC", overloads: &[overload!([PStr] -> Integer)] },
    Builtin { name: "ATN", overloads: &[overload!([Num] -> Double)] },
    Builtin { name: "CHR$", overloads: &[overload!([Num] -> Str)] },
    Builtin { name: "CINT", overloads: &[overload!([Num] -> Integer)] },
    Builtin { name: "CLNG", overloads: &[overload!([Num] -> Long)] },
    Builtin { name: "CLS", overloads: &[overload!([])] },
    Builtin { name: "COS", overloads: &[overload!([Num] -> Double)] },
    Builtin { name: "CSRLIN", overloads: &[overload!([] -> Integer)] },
    Builtin { name: "DATE$", overloads: &[overload!([] -> Str)] },
    Builtin { name: "EXP", overloads: &[overload!([Num] -> Double)] },
    Builtin { name: "FIX", overloads: &[overload!([Num] -> Double)] },
    Builtin { name: "INPUT$", overloads: &[overload!([Num] -> Str)] },
    Builtin {
        name: "INSTR",
        overloads: &[
            overload!([PStr, PStr] -> Integer),
            overload!([Num, PStr, PStr] -> Integer),
        ],
    },
    Builtin { name: "INT", overloads: &[overload!([Num] -> Double)] },
    Builtin { name: "LCASE$", overloads: &[overload!([PStr] -> Str)] },
    Builtin { name: "LEFT$", overloads: &[overload!([PStr, Num] -> Str)] },
    Builtin { name: "LEN", overloads: &[overload!([PStr] -> Long)] },
    Builtin {
        name: "LOCATE",
        overloads: &[
            overload!([Num]),
            overload!([Num, Num]),
            overload!([Num, Num, Num]),
        ],
    },
    Builtin { name: "LOG", overloads: &[overload!([Num] -> Double)] },
    Builtin { name: "LTRIM$", overloads: &[overload!([PStr] -> Str)] },
    Builtin {
        name: "MID$",
        overloads: &[
            overload!([PStr, Num] -> Str),
            overload!([PStr, Num, Num] -> Str),
        ],
    },
    Builtin { name: "POS", overloads: &[overload!([Num] -> Integer)] },
    Builtin { name: "RIGHT$", overloads: &[overload!([PStr, Num] -> Str)] },
    Builtin { name: "RND", overloads: &[overload!([] -> Single), overload!([Num] -> Single)] },
    Builtin { name: "RTRIM$", overloads: &[overload!([PStr] -> Str)] },
    Builtin { name: "SGN", overloads: &[overload!([Num] -> Integer)] },
    Builtin { name: "SIN", overloads: &[overload!([Num] -> Double)] },
    Builtin {
        name: "SLEEP",
        overloads: &[overload!([]), overload!([Num])],
    },
    Builtin { name: "SPACE$", overloads: &[overload!([Num] -> Str)] },
    Builtin { name: "SQR", overloads: &[overload!([Num] -> Double)] },
    Builtin { name: "STR$", overloads: &[overload!([Num] -> Str)] },
    Builtin { name: "STRING$", overloads: &[overload!([Num, Num] -> Str), overload!([Num, PStr] -> Str)] },
    Builtin { name: "TAN", overloads: &[overload!([Num] -> Double)] },
    Builtin { name: "TIME$", overloads: &[overload!([] -> Str)] },
    Builtin { name: "TIMER", overloads: &[overload!([] -> Single)] },
    Builtin { name: "UCASE$", overloads: &[overload!([PStr] -> Str)] },
    Builtin { name: "VAL", overloads: &[overload!([PStr] -> Double)] },
];

fn kind_matches(kind: ParamKind, arg: Option<ElementaryType>) -> bool {
    match (kind, arg) {
        (ParamKind::Num, Some(t)) => t.is_numeric(),
        (ParamKind::Str, Some(ElementaryType::String)) => true,
        _ => false,
    }
}

/// Resolve a name and argument types to (table index, overload index).
pub fn lookup_builtin(name: &str, args: &[Option<ElementaryType>]) -> Option<(usize, usize)> {
    let idx = BUILTINS.iter().position(|b| b.name == name)?;
    for (oidx, overload) in BUILTINS[idx].overloads.iter().enumerate() {
        if overload.params.len() == args.len()
            && overload
                .params
                .iter()
                .zip(args.iter())
                .all(|(kind, arg)| kind_matches(*kind, *arg))
        {
            return Some((idx, oidx));
        }
    }
    // Arity or kinds off: hand back the first overload so the caller
    // reports the mismatch against a known signature.
    Some((idx, 0))
}

/// Check the argument values against the chosen overload.
fn check_args(builtin: usize, overload: usize, args: &[Val]) -> Result<(), Error> {
    let sig = &BUILTINS[builtin].overloads[overload];
    if sig.params.len() != args.len() {
        return Err(error!(TypeMismatch; format!("{} ARGUMENTS", BUILTINS[builtin].name)));
    }
    for (kind, arg) in sig.params.iter().zip(args.iter()) {
        let ok = match kind {
            ParamKind::Num => arg.is_numeric(),
            ParamKind::Str => matches!(arg, Val::String(_)),
        };
        if !ok {
            return Err(error!(TypeMismatch; format!("{} ARGUMENT", BUILTINS[builtin].name)));
        }
    }
    Ok(())
}

/// Transcendental results carry the argument's precision.
fn float_result(arg: &Val, n: f64) -> Result<Val, Error> {
    if !n.is_finite() {
        return Err(error!(Overflow));
    }
    match arg {
        Val::Double(_) => Ok(Val::Double(n)),
        _ => Ok(Val::Single(n as f32)),
    }
}

pub fn eval_builtin(
    builtin: usize,
    overload: usize,
    args: &[Val],
    platform: &mut dyn Platform,
) -> Result<Val, Error> {
    check_args(builtin, overload, args)?;
    let name = BUILTINS[builtin].name;
    match name {
        "ABS" => match &args[0] {
            Val::Integer(n) => n
                .checked_abs()
                .map(Val::Integer)
                .ok_or_else(|| error!(Overflow)),
            Val::Long(n) => n.checked_abs().map(Val::Long).ok_or_else(|| error!(Overflow)),
            Val::Single(n) => Ok(Val::Single(n.abs())),
            v => Ok(Val::Double(v.as_f64()?.abs())),
        },
        "ASC" => {
            let s = args[0].as_string()?;
            match s.as_bytes().first() {
                Some(b) => Ok(Val::Integer(i16::from(*b))),
                None => Err(error!(IllegalFunctionCall; "ASC OF EMPTY STRING")),
            }
        }
        "ATN" => float_result(&args[0], args[0].as_f64()?.atan()),
        "CHR$" => {
            let code = args[0].as_i32()?;
            if !(0..=255).contains(&code) {
                return Err(error!(IllegalFunctionCall; "CHR$ OUT OF RANGE"));
            }
            let s: String = char::from(code as u8).to_string();
            Ok(Val::String(s.as_str().into()))
        }
        "CINT" => Ok(Val::Integer(args[0].as_i16()?)),
        "CLNG" => Ok(Val::Long(args[0].as_i32()?)),
        "CLS" => {
            platform.cls();
            Ok(Val::Integer(0))
        }
        "COS" => float_result(&args[0], args[0].as_f64()?.cos()),
        "CSRLIN" => Ok(Val::Integer(platform.cursor_pos().0 as i16)),
        "DATE$" => {
            let s = chrono::Local::now().format("%m-%d-%Y").to_string();
            Ok(Val::String(s.as_str().into()))
        }
        "EXP" => float_result(&args[0], args[0].as_f64()?.exp()),
        "FIX" => match &args[0] {
            Val::Single(n) => Ok(Val::Single(n.trunc())),
            Val::Double(n) => Ok(Val::Double(n.trunc())),
            v => Ok(v.clone()),
        },
        "INPUT$" => {
            let n = args[0].as_i32()?;
            if n < 0 {
                return Err(error!(IllegalFunctionCall; "INPUT$ COUNT"));
            }
            let line = platform.input_line();
            let s: String = line.chars().take(n as usize).collect();
            Ok(Val::String(s.as_str().into()))
        }
        "INSTR" => {
            let (start, haystack, needle) = if args.len() == 3 {
                (args[0].as_i32()?, args[1].as_string()?, args[2].as_string()?)
            } else {
                (1, args[0].as_string()?, args[1].as_string()?)
            };
            if start < 1 {
                return Err(error!(IllegalFunctionCall; "INSTR START"));
            }
            let from = (start as usize - 1).min(haystack.len());
            match haystack[from..].find(&*needle) {
                Some(pos) => Ok(Val::Integer((from + pos + 1) as i16)),
                None => Ok(Val::Integer(0)),
            }
        }
        "INT" => match &args[0] {
            Val::Single(n) => Ok(Val::Single(n.floor())),
            Val::Double(n) => Ok(Val::Double(n.floor())),
            v => Ok(v.clone()),
        },
        "LCASE$" => {
            let s = args[0].as_string()?.to_lowercase();
            Ok(Val::String(s.as_str().into()))
        }
        "LEFT$" => {
            let s = args[0].as_string()?;
            let n = args[1].as_i32()?.max(0) as usize;
            let out: String = s.chars().take(n).collect();
            Ok(Val::String(out.as_str().into()))
        }
        "LEN" => Ok(Val::Long(args[0].as_string()?.chars().count() as i32)),
        "LOCATE" => {
            let row = Some(args[0].as_i32()? as usize);
            let col = args.get(1).map(|v| v.as_i32()).transpose()?.map(|n| n as usize);
            platform.locate(row, col);
            if let Some(cursor) = args.get(2) {
                platform.set_cursor_visible(cursor.as_i32()? != 0);
            }
            Ok(Val::Integer(0))
        }
        "LOG" => {
            let n = args[0].as_f64()?;
            if n <= 0.0 {
                return Err(error!(IllegalFunctionCall; "LOG DOMAIN"));
            }
            float_result(&args[0], n.ln())
        }
        "LTRIM$" => {
            let s = args[0].as_string()?;
            Ok(Val::String(s.trim_start_matches(' ').into()))
        }
        "MID$" => {
            let s = args[0].as_string()?;
            let start = args[1].as_i32()?;
            if start < 1 {
                return Err(error!(IllegalFunctionCall; "MID$ START"));
            }
            let len = match args.get(2) {
                Some(v) => v.as_i32()?.max(0) as usize,
                None => usize::MAX,
            };
            let out: String = s.chars().skip(start as usize - 1).take(len).collect();
            Ok(Val::String(out.as_str().into()))
        }
        "POS" => Ok(Val::Integer(platform.cursor_pos().1 as i16)),
        "RIGHT$" => {
            let s = args[0].as_string()?;
            let n = args[1].as_i32()?.max(0) as usize;
            let count = s.chars().count();
            let out: String = s.chars().skip(count.saturating_sub(n)).collect();
            Ok(Val::String(out.as_str().into()))
        }
        "RND" => Ok(Val::Single(rand::thread_rng().gen::<f32>())),
        "RTRIM$" => {
            let s = args[0].as_string()?;
            Ok(Val::String(s.trim_end_matches(' ').into()))
        }
        "SGN" => {
            let n = args[0].as_f64()?;
            Ok(Val::Integer(if n > 0.0 {
                1
            } else if n < 0.0 {
                -1
            } else {
                0
            }))
        }
        "SIN" => float_result(&args[0], args[0].as_f64()?.sin()),
        "SLEEP" => {
            let seconds = match args.first() {
                Some(v) => v.as_f64()?,
                None => 0.0,
            };
            if seconds > 0.0 {
                platform.delay((seconds * 1_000_000.0) as u64);
            }
            Ok(Val::Integer(0))
        }
        "SPACE$" => {
            let n = args[0].as_i32()?.max(0) as usize;
            Ok(Val::String(" ".repeat(n).as_str().into()))
        }
        "SQR" => {
            let n = args[0].as_f64()?;
            if n < 0.0 {
                return Err(error!(IllegalFunctionCall; "SQR DOMAIN"));
            }
            float_result(&args[0], n.sqrt())
        }
        "STR$" => {
            let n = args[0].as_f64()?;
            let text = args[0].to_string();
            let s = if n >= 0.0 {
                format!(" {}", text)
            } else {
                text
            };
            Ok(Val::String(s.as_str().into()))
        }
        "STRING$" => {
            let n = args[0].as_i32()?.max(0) as usize;
            let unit = match &args[1] {
                Val::String(s) => match s.chars().next() {
                    Some(ch) => ch,
                    None => return Err(error!(IllegalFunctionCall; "STRING$ OF EMPTY STRING")),
                },
                v => {
                    let code = v.as_i32()?;
                    if !(0..=255).contains(&code) {
                        return Err(error!(IllegalFunctionCall; "STRING$ OUT OF RANGE"));
                    }
                    char::from(code as u8)
                }
            };
            let s: String = std::iter::repeat(unit).take(n).collect();
            Ok(Val::String(s.as_str().into()))
        }
        "TAN" => float_result(&args[0], args[0].as_f64()?.tan()),
        "TIME$" => {
            let s = chrono::Local::now().format("%H:%M:%S").to_string();
            Ok(Val::String(s.as_str().into()))
        }
        "TIMER" => {
            let now = chrono::Local::now();
            let seconds = f64::from(now.num_seconds_from_midnight())
                + f64::from(now.nanosecond()) / 1e9;
            Ok(Val::Single(seconds as f32))
        }
        "UCASE$" => {
            let s = args[0].as_string()?.to_uppercase();
            Ok(Val::String(s.as_str().into()))
        }
        "VAL" => {
            let s = args[0].as_string()?;
            Ok(Val::Double(parse_val(&s)))
        }
        _ => Err(error!(InternalError; format!("NO SUCH BUILTIN {}", name))),
    }
}

/// VAL semantics: parse the longest leading numeric prefix, skipping
/// leading spaces; anything unparsable is 0.
fn parse_val(s: &str) -> f64 {
    let s = s.trim_start();
    let mut end = 0;
    let bytes = s.as_bytes();
    let mut seen_digit = false;
    let mut seen_dot = false;
    let mut seen_exp = false;
    while end < bytes.len() {
        let b = bytes[end];
        match b {
            b'0'..=b'9' => seen_digit = true,
            b'+' | b'-' if end == 0 => {}
            b'+' | b'-' if end > 0 && (bytes[end - 1] == b'E' || bytes[end - 1] == b'e') => {}
            b'.' if !seen_dot && !seen_exp => seen_dot = true,
            b'E' | b'e' if seen_digit && !seen_exp => seen_exp = true,
            _ => break,
        }
        end += 1;
    }
    // Trim a dangling exponent marker.
    while end > 0 && matches!(bytes[end - 1], b'E' | b'e' | b'+' | b'-') {
        end -= 1;
    }
    s[..end].parse::<f64>().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mach::platform::CapturePlatform;

    fn eval(name: &str, args: &[Val]) -> Result<Val, Error> {
        let kinds: Vec<Option<ElementaryType>> = args
            .iter()
            .map(|v| match v {
                Val::Integer(_) => Some(ElementaryType::Integer),
                Val::Long(_) => Some(ElementaryType::Long),
                Val::Single(_) => Some(ElementaryType::Single),
                Val::Double(_) => Some(ElementaryType::Double),
                Val::String(_) => Some(ElementaryType::String),
                _ => None,
            })
            .collect();
        let (builtin, overload) = lookup_builtin(name, &kinds).unwrap();
        let mut platform = CapturePlatform::new();
        eval_builtin(builtin, overload, args, &mut platform)
    }

    #[test]
    fn test_overload_resolution() {
        assert!(matches!(
            eval("INSTR", &[Val::String("HELLO".into()), Val::String("LL".into())]),
            Ok(Val::Integer(3))
        ));
        assert!(matches!(
            eval(
                "INSTR",
                &[
                    Val::Integer(4),
                    Val::String("ABCABC".into()),
                    Val::String("A".into())
                ]
            ),
            Ok(Val::Integer(4))
        ));
        // Wrong argument kind resolves to a signature and then fails
        // the argument check.
        assert!(eval("INSTR", &[Val::Integer(1), Val::Integer(2)]).is_err());
        assert_eq!(lookup_builtin("NOSUCH", &[]), None);
    }

    #[test]
    fn test_string_functions() {
        assert!(matches!(
            eval("MID$", &[Val::String("QUICKBASIC".into()), Val::Integer(6)]),
            Ok(Val::String(s)) if &*s == "BASIC"
        ));
        assert!(matches!(
            eval(
                "MID$",
                &[Val::String("QUICKBASIC".into()), Val::Integer(1), Val::Integer(5)]
            ),
            Ok(Val::String(s)) if &*s == "QUICK"
        ));
        assert!(matches!(
            eval("RIGHT$", &[Val::String("ABCDEF".into()), Val::Integer(2)]),
            Ok(Val::String(s)) if &*s == "EF"
        ));
        assert!(matches!(
            eval("STRING$", &[Val::Integer(3), Val::Integer(65)]),
            Ok(Val::String(s)) if &*s == "AAA"
        ));
        assert!(matches!(
            eval("STRING$", &[Val::Integer(2), Val::String("XY".into())]),
            Ok(Val::String(s)) if &*s == "XX"
        ));
        assert!(matches!(
            eval("UCASE$", &[Val::String("MiXeD".into())]),
            Ok(Val::String(s)) if &*s == "MIXED"
        ));
        assert!(matches!(
            eval("LTRIM$", &[Val::String("  A ".into())]),
            Ok(Val::String(s)) if &*s == "A "
        ));
    }

    #[test]
    fn test_numeric_functions() {
        assert!(matches!(eval("ABS", &[Val::Integer(-5)]), Ok(Val::Integer(5))));
        assert!(matches!(eval("SGN", &[Val::Double(-0.2)]), Ok(Val::Integer(-1))));
        assert!(matches!(eval("CINT", &[Val::Double(2.5)]), Ok(Val::Integer(2))));
        assert!(matches!(eval("INT", &[Val::Double(-2.5)]), Ok(Val::Double(n)) if n == -3.0));
        assert!(matches!(eval("FIX", &[Val::Double(-2.5)]), Ok(Val::Double(n)) if n == -2.0));
        assert!(eval("SQR", &[Val::Integer(-1)]).is_err());
        assert!(eval("LOG", &[Val::Integer(0)]).is_err());
    }

    #[test]
    fn test_chr_asc_roundtrip() {
        let c = eval("CHR$", &[Val::Integer(65)]).unwrap();
        assert!(matches!(&c, Val::String(s) if &**s == "A"));
        assert!(matches!(eval("ASC", &[c]), Ok(Val::Integer(65))));
        assert!(eval("CHR$", &[Val::Integer(300)]).is_err());
        assert!(eval("ASC", &[Val::String("".into())]).is_err());
    }

    #[test]
    fn test_str_and_val() {
        assert!(matches!(
            eval("STR$", &[Val::Integer(3)]),
            Ok(Val::String(s)) if &*s == " 3"
        ));
        assert!(matches!(
            eval("STR$", &[Val::Double(-1.5)]),
            Ok(Val::String(s)) if &*s == "-1.5"
        ));
        assert!(matches!(
            eval("VAL", &[Val::String("  12.5AB".into())]),
            Ok(Val::Double(n)) if n == 12.5
        ));
        assert!(matches!(
            eval("VAL", &[Val::String("X".into())]),
            Ok(Val::Double(n)) if n == 0.0
        ));
        assert!(matches!(
            eval("VAL", &[Val::String("-3E2".into())]),
            Ok(Val::Double(n)) if n == -300.0
        ));
    }
}
