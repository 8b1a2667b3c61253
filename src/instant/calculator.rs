/// Arithmetic over `+ - * / ^ %` (plus the unicode `×`/`÷`/`−` forms) and
/// parentheses. Pure recursive descent; all failures are domain-typed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CalcError {
    #[error("invalid expression")]
    InvalidSyntax,
    #[error("division by zero")]
    DivideByZero,
    #[error("not an arithmetic expression")]
    NotAnExpression,
}

struct Parser<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            chars: input.chars().peekable(),
        }
    }

    fn skip_ws(&mut self) {
        while self.chars.peek().is_some_and(|c| c.is_whitespace()) {
            self.chars.next();
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_ws();
        self.chars.peek().copied()
    }

    fn bump(&mut self) -> Option<char> {
        self.skip_ws();
        self.chars.next()
    }

    fn expr(&mut self) -> Result<f64, CalcError> {
        let mut value = self.term()?;
        loop {
            match self.peek() {
                Some('+') => {
                    self.bump();
                    value += self.term()?;
                }
                Some('-') | Some('−') => {
                    self.bump();
                    value -= self.term()?;
                }
                _ => return Ok(value),
            }
        }
    }

    fn term(&mut self) -> Result<f64, CalcError> {
        let mut value = self.power()?;
        loop {
            match self.peek() {
                Some('*') | Some('×') => {
                    self.bump();
                    value *= self.power()?;
                }
                Some('/') | Some('÷') => {
                    self.bump();
                    let rhs = self.power()?;
                    if rhs == 0.0 {
                        return Err(CalcError::DivideByZero);
                    }
                    value /= rhs;
                }
                Some('%') => {
                    self.bump();
                    let rhs = self.power()?;
                    if rhs == 0.0 {
                        return Err(CalcError::DivideByZero);
                    }
                    value %= rhs;
                }
                _ => return Ok(value),
            }
        }
    }

    // Right-associative exponentiation.
    fn power(&mut self) -> Result<f64, CalcError> {
        let base = self.unary()?;
        if self.peek() == Some('^') {
            self.bump();
            let exp = self.power()?;
            return Ok(base.powf(exp));
        }
        Ok(base)
    }

    fn unary(&mut self) -> Result<f64, CalcError> {
        match self.peek() {
            Some('-') | Some('−') => {
                self.bump();
                Ok(-self.unary()?)
            }
            _ => self.primary(),
        }
    }

    fn primary(&mut self) -> Result<f64, CalcError> {
        match self.peek() {
            Some('(') => {
                self.bump();
                let value = self.expr()?;
                if self.bump() != Some(')') {
                    return Err(CalcError::InvalidSyntax);
                }
                Ok(value)
            }
            Some(c) if c.is_ascii_digit() || c == '.' => self.number(),
            _ => Err(CalcError::InvalidSyntax),
        }
    }

    fn number(&mut self) -> Result<f64, CalcError> {
        self.skip_ws();
        let mut raw = String::new();
        while self
            .chars
            .peek()
            .is_some_and(|c| c.is_ascii_digit() || *c == '.')
        {
            raw.push(self.chars.next().unwrap());
        }
        raw.parse().map_err(|_| CalcError::InvalidSyntax)
    }

    fn at_end(&mut self) -> bool {
        self.peek().is_none()
    }
}

/// Evaluate `input` as arithmetic. `NotAnExpression` distinguishes plain
/// prose (no operator, or no digits) from a malformed expression, so the
/// instant-answer detector can pass on ordinary queries silently.
pub fn evaluate(input: &str) -> Result<f64, CalcError> {
    let input = input.trim();
    if input.is_empty()
        || !input.chars().any(|c| c.is_ascii_digit())
        || !input
            .chars()
            .any(|c| matches!(c, '+' | '-' | '−' | '*' | '×' | '/' | '÷' | '^' | '%'))
    {
        return Err(CalcError::NotAnExpression);
    }
    // Anything besides digits, operators, parens, and dots is prose.
    if !input.chars().all(|c| {
        c.is_ascii_digit()
            || c.is_whitespace()
            || matches!(
                c,
                '+' | '-' | '−' | '*' | '×' | '/' | '÷' | '^' | '%' | '(' | ')' | '.'
            )
    }) {
        return Err(CalcError::NotAnExpression);
    }

    let mut parser = Parser::new(input);
    let value = parser.expr()?;
    if !parser.at_end() {
        return Err(CalcError::InvalidSyntax);
    }
    if !value.is_finite() {
        return Err(CalcError::InvalidSyntax);
    }
    Ok(value)
}
