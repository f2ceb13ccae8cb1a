//! Arithmetic over `+ - * / % ^`, parentheses and decimal numbers.

use async_trait::async_trait;
use ensemble_core::error::ToolError;
use ensemble_core::tool::{Tool, ToolResult};
use std::iter::Peekable;
use std::str::Chars;

pub struct Calculator;

#[async_trait]
impl Tool for Calculator {
    fn name(&self) -> &str {
        "calculator"
    }

    fn description(&self) -> &str {
        "Evaluate an arithmetic expression. Supports + - * / % ^, parentheses and decimals."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "expression": {
                    "type": "string",
                    "description": "The expression to evaluate, e.g. '(2 + 3) * 4'"
                }
            },
            "required": ["expression"]
        })
    }

    async fn execute(&self, arguments: serde_json::Value) -> Result<ToolResult, ToolError> {
        let expression = arguments
            .get("expression")
            .and_then(|e| e.as_str())
            .ok_or_else(|| ToolError::InvalidArguments("'expression' is required".into()))?;

        Ok(match evaluate(expression) {
            Ok(value) => ToolResult::ok(format_number(value)),
            Err(e) => ToolResult {
                success: false,
                output: format!("Error: {e}"),
            },
        })
    }
}

/// Evaluate `expression`.
///
/// `^` binds tightest and is right-associative; unary minus binds looser
/// than `^`, so `-2^2` is `-4`.
pub fn evaluate(expression: &str) -> Result<f64, String> {
    let mut parser = Parser {
        chars: expression.chars().peekable(),
    };
    let value = parser.sum()?;
    parser.skip_whitespace();
    if let Some(c) = parser.chars.peek() {
        return Err(format!("unexpected '{c}'"));
    }
    if !value.is_finite() {
        return Err("result is not a finite number".into());
    }
    Ok(value)
}

/// Whole numbers print without a fractional part.
fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        (value as i64).to_string()
    } else {
        value.to_string()
    }
}

struct Parser<'a> {
    chars: Peekable<Chars<'a>>,
}

impl Parser<'_> {
    fn skip_whitespace(&mut self) {
        while self.chars.next_if(|c| c.is_whitespace()).is_some() {}
    }

    fn eat(&mut self, symbol: char) -> bool {
        self.skip_whitespace();
        self.chars.next_if_eq(&symbol).is_some()
    }

    // sum = product (('+' | '-') product)*
    fn sum(&mut self) -> Result<f64, String> {
        let mut value = self.product()?;
        loop {
            if self.eat('+') {
                value += self.product()?;
            } else if self.eat('-') {
                value -= self.product()?;
            } else {
                return Ok(value);
            }
        }
    }

    // product = unary (('*' | '/' | '%') unary)*
    fn product(&mut self) -> Result<f64, String> {
        let mut value = self.unary()?;
        loop {
            if self.eat('*') {
                value *= self.unary()?;
            } else if self.eat('/') {
                let divisor = self.unary()?;
                if divisor == 0.0 {
                    return Err("division by zero".into());
                }
                value /= divisor;
            } else if self.eat('%') {
                let divisor = self.unary()?;
                if divisor == 0.0 {
                    return Err("modulo by zero".into());
                }
                value %= divisor;
            } else {
                return Ok(value);
            }
        }
    }

    // unary = ('-' | '+') unary | power
    fn unary(&mut self) -> Result<f64, String> {
        if self.eat('-') {
            return Ok(-self.unary()?);
        }
        if self.eat('+') {
            return self.unary();
        }
        self.power()
    }

    // power = atom ('^' unary)?
    fn power(&mut self) -> Result<f64, String> {
        let base = self.atom()?;
        if self.eat('^') {
            let exponent = self.unary()?;
            return Ok(base.powf(exponent));
        }
        Ok(base)
    }

    // atom = number | '(' sum ')'
    fn atom(&mut self) -> Result<f64, String> {
        if self.eat('(') {
            let value = self.sum()?;
            if !self.eat(')') {
                return Err("expected ')'".into());
            }
            return Ok(value);
        }

        let mut literal = String::new();
        while let Some(c) = self.chars.next_if(|c| c.is_ascii_digit() || *c == '.') {
            literal.push(c);
        }
        if literal.is_empty() {
            return Err(match self.chars.peek() {
                Some(c) => format!("unexpected '{c}'"),
                None => "unexpected end of expression".into(),
            });
        }
        literal
            .parse()
            .map_err(|_| format!("invalid number '{literal}'"))
    }
}
