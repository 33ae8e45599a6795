//! Arithmetic expressions as they show up in experiment notes, e.g. `exp(-1/(10*12))` or `1e-3`.
//!
//! ```text
//! expr  := term (('+' | '-') term)*
//! term  := unary (('*' | '/') unary)*
//! unary := ('-' | '+') unary | power
//! power := atom (('^' | '**') unary)?
//! atom  := number | constant | function '(' expr ')' | '(' expr ')'
//! ```
//! Constants: `e`, `pi`. Functions: `exp`, `ln`, `log`, `log10`, `sqrt`, `abs`.
//! Identifiers may carry a module prefix (`np.exp`, `math.pi`).

use std::f64::consts::{E, PI};
use std::fmt::{Display, Formatter};

/// Deepest nesting of parentheses and signs the parser descends into
const MAX_NESTING: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct ExprError {
    /// byte offset into the expression
    pub position: usize,
    pub message: String,
}

impl ExprError {
    fn at(
        position: usize,
        message: impl Into<String>,
    ) -> Self {
        Self {
            position,
            message: message.into(),
        }
    }
}

impl Display for ExprError {
    fn fmt(
        &self,
        f: &mut Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "{} at position {}", self.message, self.position)
    }
}

impl std::error::Error for ExprError {}

pub fn eval(input: &str) -> Result<f64, ExprError> {
    let mut parser = Parser {
        input: input.as_bytes(),
        pos: 0,
        depth: 0,
    };
    let value = parser.expr()?;
    parser.skip_whitespace();
    if parser.pos < parser.input.len() {
        return Err(ExprError::at(parser.pos, "unexpected input"));
    }
    if !value.is_finite() {
        return Err(ExprError::at(0, format!("result {} is not finite", value)));
    }
    Ok(value)
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn skip_whitespace(&mut self) {
        while self.pos < self.input.len() && self.input[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&mut self) -> Option<u8> {
        self.skip_whitespace();
        self.input.get(self.pos).copied()
    }

    fn consume(
        &mut self,
        token: &str,
    ) -> bool {
        self.skip_whitespace();
        if self.input[self.pos..].starts_with(token.as_bytes()) {
            self.pos += token.len();
            true
        } else {
            false
        }
    }

    fn expr(&mut self) -> Result<f64, ExprError> {
        let mut value = self.term()?;
        loop {
            if self.consume("+") {
                value += self.term()?;
            } else if self.consume("-") {
                value -= self.term()?;
            } else {
                return Ok(value);
            }
        }
    }

    fn term(&mut self) -> Result<f64, ExprError> {
        let mut value = self.unary()?;
        loop {
            // `**` belongs to power
            if self.peek() == Some(b'*') && self.input.get(self.pos + 1) != Some(&b'*') {
                self.pos += 1;
                value *= self.unary()?;
            } else if self.consume("/") {
                value /= self.unary()?;
            } else {
                return Ok(value);
            }
        }
    }

    fn unary(&mut self) -> Result<f64, ExprError> {
        if self.depth >= MAX_NESTING {
            return Err(ExprError::at(self.pos, "expression nested too deeply"));
        }
        self.depth += 1;
        let value = self.signed();
        self.depth -= 1;
        value
    }

    fn signed(&mut self) -> Result<f64, ExprError> {
        if self.consume("-") {
            Ok(-self.unary()?)
        } else if self.consume("+") {
            self.unary()
        } else {
            self.power()
        }
    }

    fn power(&mut self) -> Result<f64, ExprError> {
        let base = self.atom()?;
        if self.consume("**") || self.consume("^") {
            let exponent = self.unary()?;
            Ok(base.powf(exponent))
        } else {
            Ok(base)
        }
    }

    fn atom(&mut self) -> Result<f64, ExprError> {
        match self.peek() {
            None => Err(ExprError::at(self.pos, "unexpected end of expression")),
            Some(b'(') => {
                self.pos += 1;
                let value = self.expr()?;
                self.expect_closing_parenthesis()?;
                Ok(value)
            }
            Some(c) if c.is_ascii_digit() || c == b'.' => self.number(),
            Some(c) if c.is_ascii_alphabetic() || c == b'_' => self.identifier(),
            Some(_) => Err(ExprError::at(self.pos, "unexpected character")),
        }
    }

    fn expect_closing_parenthesis(&mut self) -> Result<(), ExprError> {
        match self.consume(")") {
            true => Ok(()),
            false => Err(ExprError::at(self.pos, "missing ')'")),
        }
    }

    fn number(&mut self) -> Result<f64, ExprError> {
        let start = self.pos;
        let digits = |p: &mut Self| {
            while p.pos < p.input.len() && p.input[p.pos].is_ascii_digit() {
                p.pos += 1;
            }
        };
        digits(self);
        if self.input.get(self.pos) == Some(&b'.') {
            self.pos += 1;
            digits(self);
        }
        // exponent only, if digits follow
        if matches!(self.input.get(self.pos), Some(b'e' | b'E')) {
            let mark = self.pos;
            self.pos += 1;
            if matches!(self.input.get(self.pos), Some(b'+' | b'-')) {
                self.pos += 1;
            }
            if matches!(self.input.get(self.pos), Some(c) if c.is_ascii_digit()) {
                digits(self);
            } else {
                self.pos = mark;
            }
        }
        let text = std::str::from_utf8(&self.input[start..self.pos]).map_err(|_| ExprError::at(start, "invalid number"))?;
        text.parse::<f64>().map_err(|_| ExprError::at(start, format!("invalid number '{}'", text)))
    }

    fn identifier(&mut self) -> Result<f64, ExprError> {
        let start = self.pos;
        while self.pos < self.input.len() && (self.input[self.pos].is_ascii_alphanumeric() || matches!(self.input[self.pos], b'_' | b'.')) {
            self.pos += 1;
        }
        let full_name = std::str::from_utf8(&self.input[start..self.pos]).map_err(|_| ExprError::at(start, "invalid identifier"))?;
        let name = full_name.rsplit('.').next().unwrap_or(full_name).to_ascii_lowercase();

        if self.consume("(") {
            let argument = self.expr()?;
            self.expect_closing_parenthesis()?;
            let function: fn(f64) -> f64 = match name.as_str() {
                "exp" => f64::exp,
                "ln" | "log" => f64::ln,
                "log10" => f64::log10,
                "sqrt" => f64::sqrt,
                "abs" => f64::abs,
                _ => return Err(ExprError::at(start, format!("unknown function '{}'", full_name))),
            };
            Ok(function(argument))
        } else {
            match name.as_str() {
                "e" => Ok(E),
                "pi" => Ok(PI),
                _ => Err(ExprError::at(start, format!("unknown constant '{}'", full_name))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("0.1", 0.1)]
    #[case(" 1e3 ", 1000.0)]
    #[case("2.5E-1", 0.25)]
    #[case(".5", 0.5)]
    #[case("10*100", 1000.0)]
    #[case("1 + 2 * 3", 7.0)]
    #[case("(1 + 2) * 3", 9.0)]
    #[case("8 / 4 / 2", 1.0)]
    #[case("7 - 2 - 1", 4.0)]
    #[case("2^3^2", 512.0)]
    #[case("2**3", 8.0)]
    #[case("-2^2", -4.0)]
    #[case("2^-1", 0.5)]
    #[case("--3", 3.0)]
    #[case("exp(0)", 1.0)]
    #[case("ln(e)", 1.0)]
    #[case("log10(1000)", 3.0)]
    #[case("sqrt(16) + abs(-2)", 6.0)]
    #[case("math.pi / pi", 1.0)]
    fn test_eval(
        #[case] input: &str,
        #[case] expected: f64,
    ) {
        let value = eval(input).unwrap();
        assert!((value - expected).abs() < 1e-12, "{} = {}, expected {}", input, value, expected);
    }

    #[test]
    fn test_discount_formula() {
        assert_eq!(eval("exp(-1/(10*12))").unwrap(), (-1.0_f64 / 120.0).exp());
        assert_eq!(eval("np.exp(-1/120)").unwrap(), (-1.0_f64 / 120.0).exp());
    }

    #[test]
    fn test_nesting_depth() {
        let nested = |n: usize| format!("{}1{}", "(".repeat(n), ")".repeat(n));
        assert_eq!(eval(&nested(50)).unwrap(), 1.0);

        let e = eval(&nested(10_000)).unwrap_err();
        assert!(e.message.contains("nested too deeply"), "{}", e);
        assert_eq!(e.position, MAX_NESTING);
        assert!(eval(&"-".repeat(10_000)).is_err());
    }

    #[rstest]
    #[case("", 0)]
    #[case("1 +", 3)]
    #[case("(1 + 2", 6)]
    #[case("1 2", 2)]
    #[case("foo(1)", 0)]
    #[case("x", 0)]
    #[case("1 / 0", 0)]
    #[case("ln(-1)", 0)]
    #[case("3 $ 4", 2)]
    fn test_eval_errors(
        #[case] input: &str,
        #[case] position: usize,
    ) {
        let e = eval(input).unwrap_err();
        assert_eq!(e.position, position, "{}", e);
    }
}
