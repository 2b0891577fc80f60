//! Arithmetic expression evaluator for the `calculator` tool.
//!
//! Grammar (lowest to highest precedence):
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/' | '%') unary)*
//! unary   := ('+' | '-') unary | power
//! power   := primary ('**' unary)?        right-associative
//! primary := number | IDENT | IDENT '(' args ')' | '(' expr ')'
//! ```
//!
//! `-2 ** 2` is `-(2 ** 2)`. Positions in error messages are 0-based char offsets.

use rand::Rng;
use toolpipe_core::{Error, Result};

pub const MAX_EXPRESSION_CHARS: usize = 1_000;
const MAX_DEPTH: usize = 64;

pub fn evaluate(expression: &str) -> Result<f64> {
    let chars: Vec<char> = expression.chars().collect();
    if chars.len() > MAX_EXPRESSION_CHARS {
        return Err(Error::InvalidParams(format!(
            "expression must be at most {MAX_EXPRESSION_CHARS} characters"
        )));
    }
    let mut p = Parser {
        chars,
        pos: 0,
        depth: 0,
    };
    p.skip_ws();
    if p.at_end() {
        return Err(Error::Tool("empty expression".to_string()));
    }
    let v = p.expr()?;
    p.skip_ws();
    if let Some(c) = p.peek() {
        return Err(p.unexpected(c));
    }
    if !v.is_finite() {
        return Err(Error::Tool("Invalid calculation result".to_string()));
    }
    Ok(v)
}

/// Integral results serialize as JSON integers (`4`, not `4.0`).
pub fn to_json_number(x: f64) -> serde_json::Value {
    const MAX_EXACT: f64 = 9_007_199_254_740_992.0; // 2^53
    if x.fract() == 0.0 && x.abs() < MAX_EXACT {
        serde_json::Value::from(x as i64)
    } else {
        serde_json::Value::from(x)
    }
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn at_end(&self) -> bool {
        self.pos >= self.chars.len()
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_ws(&mut self) {
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
    }

    fn eat(&mut self, c: char) -> bool {
        self.skip_ws();
        if self.peek() == Some(c) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_pow(&mut self) -> bool {
        self.skip_ws();
        if self.peek() == Some('*') && self.chars.get(self.pos + 1) == Some(&'*') {
            self.pos += 2;
            true
        } else {
            false
        }
    }

    fn unexpected(&self, c: char) -> Error {
        Error::Tool(format!("unexpected '{c}' at position {}", self.pos))
    }

    fn eof(&self) -> Error {
        Error::Tool(format!("unexpected end of expression at position {}", self.pos))
    }

    fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(Error::Tool(format!(
                "expression nests too deeply at position {}",
                self.pos
            )));
        }
        Ok(())
    }

    fn expr(&mut self) -> Result<f64> {
        self.enter()?;
        let mut acc = self.term()?;
        loop {
            if self.eat('+') {
                acc += self.term()?;
            } else if self.eat('-') {
                acc -= self.term()?;
            } else {
                break;
            }
        }
        self.depth -= 1;
        Ok(acc)
    }

    fn term(&mut self) -> Result<f64> {
        let mut acc = self.unary()?;
        loop {
            self.skip_ws();
            match self.peek() {
                Some('*') if self.chars.get(self.pos + 1) != Some(&'*') => {
                    self.pos += 1;
                    acc *= self.unary()?;
                }
                Some('/') => {
                    self.pos += 1;
                    acc /= self.unary()?;
                }
                Some('%') => {
                    self.pos += 1;
                    acc %= self.unary()?;
                }
                _ => break,
            }
        }
        Ok(acc)
    }

    fn unary(&mut self) -> Result<f64> {
        self.enter()?;
        let v = if self.eat('-') {
            -self.unary()?
        } else if self.eat('+') {
            self.unary()?
        } else {
            self.power()?
        };
        self.depth -= 1;
        Ok(v)
    }

    fn power(&mut self) -> Result<f64> {
        let base = self.primary()?;
        if self.eat_pow() {
            let exp = self.unary()?;
            return Ok(base.powf(exp));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<f64> {
        self.skip_ws();
        let Some(c) = self.peek() else {
            return Err(self.eof());
        };
        if c == '(' {
            self.pos += 1;
            let v = self.expr()?;
            if !self.eat(')') {
                return Err(match self.peek() {
                    Some(c) => self.unexpected(c),
                    None => self.eof(),
                });
            }
            return Ok(v);
        }
        if c.is_ascii_digit() || c == '.' {
            return self.number();
        }
        if c.is_ascii_alphabetic() || c == '_' {
            return self.ident();
        }
        Err(self.unexpected(c))
    }

    fn number(&mut self) -> Result<f64> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit() || c == '.') {
            self.pos += 1;
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let save = self.pos;
            self.pos += 1;
            if matches!(self.peek(), Some('+' | '-')) {
                self.pos += 1;
            }
            if self.peek().is_some_and(|c| c.is_ascii_digit()) {
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.pos += 1;
                }
            } else {
                self.pos = save;
            }
        }
        let lit: String = self.chars[start..self.pos].iter().collect();
        lit.parse::<f64>()
            .map_err(|_| Error::Tool(format!("invalid number '{lit}' at position {start}")))
    }

    fn ident(&mut self) -> Result<f64> {
        let start = self.pos;
        while self
            .peek()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            self.pos += 1;
        }
        let name: String = self.chars[start..self.pos].iter().collect();

        if !self.eat('(') {
            return match name.as_str() {
                "PI" => Ok(std::f64::consts::PI),
                "E" => Ok(std::f64::consts::E),
                _ => Err(Error::Tool(format!(
                    "unknown identifier '{name}' at position {start}"
                ))),
            };
        }

        let args = self.args()?;
        call(&name, &args).map_err(|msg| Error::Tool(format!("{msg} at position {start}")))
    }

    fn args(&mut self) -> Result<Vec<f64>> {
        let mut out = Vec::new();
        if self.eat(')') {
            return Ok(out);
        }
        loop {
            out.push(self.expr()?);
            if self.eat(',') {
                continue;
            }
            if self.eat(')') {
                return Ok(out);
            }
            return Err(match self.peek() {
                Some(c) => self.unexpected(c),
                None => self.eof(),
            });
        }
    }
}

fn call(name: &str, args: &[f64]) -> std::result::Result<f64, String> {
    let unary = |f: fn(f64) -> f64| -> std::result::Result<f64, String> {
        match args {
            [x] => Ok(f(*x)),
            _ => Err(format!("{name} expects 1 argument, got {}", args.len())),
        }
    };
    match name {
        "sqrt" => unary(f64::sqrt),
        "abs" => unary(f64::abs),
        "sin" => unary(f64::sin),
        "cos" => unary(f64::cos),
        "tan" => unary(f64::tan),
        "log" => unary(f64::ln),
        "log10" => unary(f64::log10),
        "log2" => unary(f64::log2),
        "exp" => unary(f64::exp),
        // Half-way cases round toward +inf.
        "round" => unary(|x| (x + 0.5).floor()),
        "floor" => unary(f64::floor),
        "ceil" => unary(f64::ceil),
        "pow" => match args {
            [b, e] => Ok(b.powf(*e)),
            _ => Err(format!("pow expects 2 arguments, got {}", args.len())),
        },
        "min" | "max" if args.is_empty() => Err(format!("{name} expects at least 1 argument")),
        "min" => Ok(args.iter().copied().fold(f64::INFINITY, f64::min)),
        "max" => Ok(args.iter().copied().fold(f64::NEG_INFINITY, f64::max)),
        "random" if args.is_empty() => Ok(rand::rng().random::<f64>()),
        "random" => Err(format!("random expects no arguments, got {}", args.len())),
        _ => Err(format!("unknown function '{name}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(s: &str) -> f64 {
        evaluate(s).unwrap()
    }

    fn err(s: &str) -> String {
        evaluate(s).unwrap_err().to_string()
    }

    #[test]
    fn precedence_and_associativity() {
        assert_eq!(eval("2 + 3 * 4"), 14.0);
        assert_eq!(eval("(5 * 3) + 10"), 25.0);
        assert_eq!(eval("10 - 4 - 3"), 3.0);
        assert_eq!(eval("2 ** 3 ** 2"), 512.0);
        assert_eq!(eval("-2 ** 2"), -4.0);
        assert_eq!(eval("2 ** -1"), 0.5);
        assert_eq!(eval("7 % 4"), 3.0);
        assert_eq!(eval("-7 % 4"), -3.0);
        assert_eq!(eval("1.5e3 / 3"), 500.0);
    }

    #[test]
    fn functions_and_constants() {
        assert_eq!(eval("sqrt(16)"), 4.0);
        assert_eq!(eval("pow(2, 10)"), 1024.0);
        assert_eq!(eval("max(1, 7, 3) - min(4, -2)"), 9.0);
        assert_eq!(eval("round(2.5) + round(-2.5)"), 1.0);
        assert_eq!(eval("floor(-1.5) + ceil(1.2)"), 0.0);
        assert!((eval("sin(PI / 2)") - 1.0).abs() < 1e-12);
        assert!((eval("log(E)") - 1.0).abs() < 1e-12);
        assert!((eval("log10(1000) + log2(8)") - 6.0).abs() < 1e-12);
        let r = eval("random()");
        assert!((0.0..1.0).contains(&r));
    }

    #[test]
    fn non_finite_results_are_rejected() {
        assert_eq!(err("1 / 0"), "Invalid calculation result");
        assert_eq!(err("sqrt(-1)"), "Invalid calculation result");
        assert_eq!(err("log(0)"), "Invalid calculation result");
    }

    #[test]
    fn errors_name_the_position() {
        assert_eq!(err("2 + $"), "unexpected '$' at position 4");
        assert_eq!(err("(1 + 2"), "unexpected end of expression at position 6");
        assert_eq!(err("foo + 1"), "unknown identifier 'foo' at position 0");
        assert_eq!(err("1 + nope(2)"), "unknown function 'nope' at position 4");
        assert_eq!(err("pow(2)"), "pow expects 2 arguments, got 1 at position 0");
        assert_eq!(err("2 3"), "unexpected '3' at position 2");
        assert_eq!(err("   "), "empty expression");
    }

    #[test]
    fn no_code_execution_surface() {
        assert!(evaluate("process.exit(1)").is_err());
        assert!(evaluate("constructor").is_err());
    }

    #[test]
    fn deep_nesting_is_bounded() {
        let deep = format!("{}1{}", "(".repeat(200), ")".repeat(200));
        assert!(err(&deep).contains("nests too deeply"));
        let minus = format!("{}1", "-".repeat(200));
        assert!(evaluate(&minus).is_err());
    }

    #[test]
    fn integral_values_serialize_as_integers() {
        assert_eq!(to_json_number(4.0), serde_json::json!(4));
        assert_eq!(to_json_number(-0.5), serde_json::json!(-0.5));
    }
}
