//! Parser for the system description language.

use std::collections::HashMap;
use std::sync::Arc;

use super::ast::*;
use super::lexer::{parse_value, Lexer, Token, TokenKind};
use crate::error::{AlgebraError, Result};
use crate::expr::{BinaryOp, Expr, Function, UserFunction};
use crate::native::builtins;

/// Parser for system descriptions.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
    peeked: Option<Token>,
    /// Functions declared with `.func`, by name
    functions: HashMap<String, Arc<UserFunction>>,
}

impl<'a> Parser<'a> {
    /// Create a new parser with the given lexer.
    pub fn new(mut lexer: Lexer<'a>) -> Result<Self> {
        let current = lexer.next_token()?;
        Ok(Self {
            lexer,
            current,
            peeked: None,
            functions: HashMap::new(),
        })
    }

    /// Parse the entire description.
    pub fn parse(&mut self) -> Result<SystemAst> {
        let mut ast = SystemAst::new();

        while self.current.kind != TokenKind::Eof {
            // Skip empty lines
            if self.current.kind == TokenKind::Newline {
                self.advance()?;
                continue;
            }

            match self.current.kind {
                TokenKind::Directive => self.parse_directive(&mut ast)?,
                TokenKind::Identifier => {
                    let keyword = ComponentType::from_keyword(&self.current.text).is_some();
                    let next = self.peek_kind()?;
                    if !keyword && matches!(next, TokenKind::Equals | TokenKind::OpenParen) {
                        let formula = self.parse_formula()?;
                        if ast.formulas.iter().any(|f| f.unknown == formula.unknown) {
                            return Err(AlgebraError::DuplicateFormula {
                                unknown: formula.unknown.to_string(),
                                line: formula.line,
                            });
                        }
                        ast.formulas.push(formula);
                    } else {
                        let component = self.parse_component()?;
                        ast.components.push(component);
                    }
                }
                _ => {
                    return Err(AlgebraError::parse(
                        self.current.line,
                        format!("unexpected token: {:?}", self.current.text),
                    ));
                }
            }

            self.end_of_line()?;
        }

        Ok(ast)
    }

    /// Parse a single expression, which must span the whole input.
    pub fn parse_standalone_expr(&mut self) -> Result<Expr> {
        let expr = self.parse_expr()?;
        while self.current.kind == TokenKind::Newline {
            self.advance()?;
        }
        if self.current.kind != TokenKind::Eof {
            return Err(AlgebraError::parse(
                self.current.line,
                format!("unexpected token after expression: {:?}", self.current.text),
            ));
        }
        Ok(expr)
    }

    fn advance(&mut self) -> Result<()> {
        self.current = if let Some(tok) = self.peeked.take() {
            tok
        } else {
            self.lexer.next_token()?
        };
        Ok(())
    }

    /// Kind of the token after the current one.
    fn peek_kind(&mut self) -> Result<TokenKind> {
        if let Some(tok) = &self.peeked {
            return Ok(tok.kind);
        }
        let tok = self.lexer.next_token()?;
        let kind = tok.kind;
        self.peeked = Some(tok);
        Ok(kind)
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token> {
        if self.current.kind == kind {
            let tok = self.current.clone();
            self.advance()?;
            Ok(tok)
        } else {
            Err(AlgebraError::parse(
                self.current.line,
                format!("expected {:?}, got {:?}", kind, self.current.kind),
            ))
        }
    }

    fn at_line_end(&self) -> bool {
        matches!(self.current.kind, TokenKind::Newline | TokenKind::Eof)
    }

    fn end_of_line(&mut self) -> Result<()> {
        match self.current.kind {
            TokenKind::Newline => self.advance(),
            TokenKind::Eof => Ok(()),
            _ => Err(AlgebraError::parse(
                self.current.line,
                format!("unexpected {:?} at end of line", self.current.text),
            )),
        }
    }

    fn parse_directive(&mut self, ast: &mut SystemAst) -> Result<()> {
        let directive = self.current.text.clone();
        let line = self.current.line;
        self.advance()?;

        match directive.to_lowercase().as_str() {
            ".input" => {
                while !self.at_line_end() {
                    let node = self.expect(TokenKind::Identifier)?;
                    ast.inputs.push(node.text);
                }
            }
            ".output" => {
                while !self.at_line_end() {
                    let expr = self.parse_expr()?;
                    ast.outputs.push(expr);
                }
            }
            ".state" => {
                let name = self.expect(TokenKind::Identifier)?.text;
                let initial = if self.at_line_end() {
                    0.0
                } else {
                    self.parse_expr()?
                        .evaluate()?
                        .to_f64()
                        .ok_or_else(|| AlgebraError::parse(line, "state value must be numeric"))?
                };
                ast.states.push(StateDef {
                    name,
                    initial,
                    line,
                });
            }
            ".history" => {
                let current = self.parse_expr()?;
                let previous = self.parse_expr()?;
                ast.history.push(HistoryDef {
                    current,
                    previous,
                    line,
                });
            }
            ".iterate" => {
                let mut group = Vec::new();
                while !self.at_line_end() {
                    group.push(self.parse_primary()?);
                }
                if group.is_empty() {
                    return Err(AlgebraError::parse(line, ".iterate needs at least one unknown"));
                }
                ast.groups.push(group);
            }
            ".func" => self.parse_function_def(line)?,
            ".model" => {
                let model = self.parse_model_def(line)?;
                if ast.models.contains_key(&model.name) {
                    return Err(AlgebraError::DuplicateModel { name: model.name });
                }
                ast.models.insert(model.name.clone(), model);
            }
            _ => {
                return Err(AlgebraError::parse(
                    line,
                    format!("unknown directive: {}", directive),
                ));
            }
        }

        Ok(())
    }

    /// `.func name(p, q) = body`
    fn parse_function_def(&mut self, line: usize) -> Result<()> {
        let name = self.expect(TokenKind::Identifier)?.text;
        if builtins::lookup(&name).is_some() {
            return Err(AlgebraError::parse(
                line,
                format!("cannot redefine builtin function {}", name),
            ));
        }
        self.expect(TokenKind::OpenParen)?;
        let mut params = Vec::new();
        while self.current.kind != TokenKind::CloseParen {
            if !params.is_empty() {
                self.expect(TokenKind::Comma)?;
            }
            params.push(self.expect(TokenKind::Identifier)?.text);
        }
        self.expect(TokenKind::CloseParen)?;
        self.expect(TokenKind::Equals)?;
        let body = self.parse_expr()?;

        let params: Vec<&str> = params.iter().map(String::as_str).collect();
        let function = UserFunction::defined(name.as_str(), &params, body);
        self.functions.insert(name, Arc::new(function));
        Ok(())
    }

    fn parse_model_def(&mut self, line: usize) -> Result<ModelDef> {
        let name = self.expect(TokenKind::Identifier)?.text;
        let type_str = self.expect(TokenKind::Identifier)?.text;

        let model_type = ModelType::parse(&type_str).ok_or_else(|| {
            AlgebraError::parse(line, format!("unknown model type: {}", type_str))
        })?;

        let mut params = HashMap::new();

        // Parse parameters in parentheses: (param=value param2=value2)
        if self.current.kind == TokenKind::OpenParen {
            self.advance()?;

            while self.current.kind != TokenKind::CloseParen && !self.at_line_end() {
                let param_name = self.expect(TokenKind::Identifier)?.text;
                self.expect(TokenKind::Equals)?;
                let value = self.parse_number(line)?;
                params.insert(param_name.to_lowercase(), value);
            }

            self.expect(TokenKind::CloseParen)?;
        }

        Ok(ModelDef {
            name,
            model_type,
            params,
            line,
        })
    }

    /// A literal value with an optional leading minus, as used for
    /// component and model parameters.
    fn parse_number(&mut self, line: usize) -> Result<f64> {
        let negative = self.current.kind == TokenKind::Minus;
        if negative {
            self.advance()?;
        }
        let text = self.expect(TokenKind::Number)?.text;
        let value = parse_value(&text)
            .ok_or_else(|| AlgebraError::parse(line, format!("invalid number: {}", text)))?;
        Ok(if negative { -value } else { value })
    }

    fn parse_component(&mut self) -> Result<ComponentDef> {
        let first_token = self.current.text.clone();
        let line = self.current.line;
        self.advance()?;

        // Keywords first, so DELAY isn't mistaken for a diode
        let (component_type, name) = if let Some(ct) = ComponentType::from_keyword(&first_token) {
            // For keyword-based types the NEXT token is the name
            let actual_name = self.expect(TokenKind::Identifier)?.text;
            (ct, actual_name)
        } else {
            let first_char = first_token.chars().next().unwrap_or('?');
            let ct = ComponentType::from_prefix(first_char).ok_or_else(|| {
                AlgebraError::UnknownComponentType {
                    component_type: first_token.clone(),
                    line,
                }
            })?;
            (ct, first_token)
        };

        let expected_nodes = component_type.expected_node_count();
        let mut nodes = Vec::with_capacity(expected_nodes);
        let mut value = None;
        let mut model_ref = None;
        let mut params = HashMap::new();

        // Parse nodes and optional parameters until end of line
        while !self.at_line_end() {
            match self.current.kind {
                TokenKind::Identifier => {
                    let text = self.current.text.clone();
                    self.advance()?;

                    // Check for param=value syntax
                    if self.current.kind == TokenKind::Equals {
                        self.advance()?; // consume '='
                        let v = self.parse_number(line)?;
                        params.insert(text.to_lowercase(), v);
                        continue;
                    }

                    if nodes.len() >= expected_nodes {
                        // Past the nodes, a bare name is a model reference
                        model_ref = Some(text);
                    } else if text.to_uppercase() == "GND" {
                        nodes.push("0".to_string());
                    } else {
                        nodes.push(text);
                    }
                }
                TokenKind::Number => {
                    let text = self.current.text.clone();
                    self.advance()?;

                    if text == "0" && nodes.len() < expected_nodes {
                        // Ground node
                        nodes.push("0".to_string());
                    } else if let Some(v) = parse_value(&text) {
                        if value.replace(v).is_some() {
                            return Err(AlgebraError::invalid_component(
                                &name,
                                line,
                                "more than one value given",
                            ));
                        }
                    } else {
                        return Err(AlgebraError::parse(line, format!("invalid number: {}", text)));
                    }
                }
                _ => {
                    return Err(AlgebraError::parse(
                        line,
                        format!("unexpected {:?} in component {}", self.current.text, name),
                    ));
                }
            }
        }

        // Validate node count
        if nodes.len() < expected_nodes {
            return Err(AlgebraError::invalid_component(
                &name,
                line,
                format!("expected {} nodes, got {}", expected_nodes, nodes.len()),
            ));
        }

        Ok(ComponentDef {
            component_type,
            name,
            nodes,
            value,
            model_ref,
            params,
            line,
        })
    }

    /// `quantity = expr`
    fn parse_formula(&mut self) -> Result<FormulaDef> {
        let line = self.current.line;
        let unknown = self.parse_primary()?;
        let is_quantity = match &unknown {
            Expr::Variable(_) => true,
            Expr::Call(call) => call.is_opaque(),
            _ => false,
        };
        if !is_quantity {
            return Err(AlgebraError::parse(
                line,
                format!("cannot assign to {}", unknown),
            ));
        }
        self.expect(TokenKind::Equals)?;
        let formula = self.parse_expr()?;
        Ok(FormulaDef {
            unknown,
            formula,
            line,
        })
    }

    // ============ Expressions ============
    //
    // expr       = additive [ compare additive ]
    // additive   = term { ('+' | '-') term }
    // term       = unary { ('*' | '/') unary }
    // unary      = ('-' | '!') unary | power
    // power      = primary [ '^' unary ]
    // primary    = number | name [ '(' args ')' ] | '(' expr ')'

    pub(crate) fn parse_expr(&mut self) -> Result<Expr> {
        let left = self.parse_additive()?;
        let op = match self.current.kind {
            TokenKind::EqualEqual => BinaryOp::Equal,
            TokenKind::NotEqual => BinaryOp::NotEqual,
            TokenKind::Less => BinaryOp::Less,
            TokenKind::LessEqual => BinaryOp::LessEqual,
            TokenKind::Greater => BinaryOp::Greater,
            TokenKind::GreaterEqual => BinaryOp::GreaterEqual,
            _ => return Ok(left),
        };
        self.advance()?;
        let right = self.parse_additive()?;
        Ok(Expr::binary(op, left, right))
    }

    fn parse_additive(&mut self) -> Result<Expr> {
        let mut expr = self.parse_term()?;
        loop {
            match self.current.kind {
                TokenKind::Plus => {
                    self.advance()?;
                    expr = expr + self.parse_term()?;
                }
                TokenKind::Minus => {
                    self.advance()?;
                    expr = expr - self.parse_term()?;
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_term(&mut self) -> Result<Expr> {
        let mut expr = self.parse_unary()?;
        loop {
            match self.current.kind {
                TokenKind::Star => {
                    self.advance()?;
                    expr = expr * self.parse_unary()?;
                }
                TokenKind::Slash => {
                    self.advance()?;
                    expr = expr / self.parse_unary()?;
                }
                _ => return Ok(expr),
            }
        }
    }

    fn parse_unary(&mut self) -> Result<Expr> {
        match self.current.kind {
            TokenKind::Minus => {
                self.advance()?;
                Ok(-self.parse_unary()?)
            }
            TokenKind::Bang => {
                self.advance()?;
                Ok(Expr::not(self.parse_unary()?))
            }
            _ => self.parse_power(),
        }
    }

    fn parse_power(&mut self) -> Result<Expr> {
        let base = self.parse_primary()?;
        if self.current.kind != TokenKind::Caret {
            return Ok(base);
        }
        self.advance()?;
        let exponent = self.parse_unary()?;
        Ok(Expr::power(base, exponent))
    }

    fn parse_primary(&mut self) -> Result<Expr> {
        let tok = self.current.clone();
        match tok.kind {
            TokenKind::Number => {
                self.advance()?;
                if tok.text.bytes().all(|b| b.is_ascii_digit()) {
                    if let Ok(n) = tok.text.parse::<i64>() {
                        return Ok(Expr::integer(n));
                    }
                }
                let value = parse_value(&tok.text).ok_or_else(|| {
                    AlgebraError::parse(tok.line, format!("invalid number: {}", tok.text))
                })?;
                Ok(Expr::real(value))
            }
            TokenKind::Identifier => {
                self.advance()?;
                if self.current.kind != TokenKind::OpenParen {
                    return Ok(Expr::var(tok.text.as_str()));
                }
                self.advance()?;
                let mut args = Vec::new();
                while self.current.kind != TokenKind::CloseParen {
                    if !args.is_empty() {
                        self.expect(TokenKind::Comma)?;
                    }
                    args.push(self.parse_expr()?);
                }
                self.expect(TokenKind::CloseParen)?;
                let function = self.function(&tok.text, &args, tok.line)?;
                Ok(Expr::call(function, args))
            }
            TokenKind::OpenParen => {
                self.advance()?;
                let expr = self.parse_expr()?;
                self.expect(TokenKind::CloseParen)?;
                Ok(expr)
            }
            _ => Err(AlgebraError::parse(
                tok.line,
                format!("expected an expression, got {:?}", tok.text),
            )),
        }
    }

    /// Builtins first, then `.func` definitions; any other name is an opaque
    /// quantity such as `V_out(t)`.
    fn function(&self, name: &str, args: &[Expr], line: usize) -> Result<Function> {
        let function: Function = if let Some(native) = builtins::lookup(name) {
            native.into()
        } else if let Some(user) = self.functions.get(name) {
            Function::User(user.clone())
        } else {
            return Ok(UserFunction::opaque_arity(name, args.len()).into());
        };
        if !function.can_call(args) {
            return Err(AlgebraError::parse(
                line,
                format!("wrong number of arguments to {}", name),
            ));
        }
        Ok(function)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsl::{parse, parse_expr};
    use crate::system::{delayed, dependent};

    #[test]
    fn test_parse_resistor() {
        let ast = parse("R1 in out 10k").unwrap();
        assert_eq!(ast.components.len(), 1);
        assert_eq!(ast.components[0].component_type, ComponentType::Resistor);
        assert_eq!(ast.components[0].name, "R1");
        assert_eq!(ast.components[0].nodes, vec!["in", "out"]);
        assert_eq!(ast.components[0].value, Some(10_000.0));
    }

    #[test]
    fn test_parse_delay_keyword() {
        let ast = parse("DELAY B1 in out\nD1 out GND DCLIP").unwrap();
        assert_eq!(ast.components[0].component_type, ComponentType::Delay);
        assert_eq!(ast.components[0].name, "B1");
        assert_eq!(ast.components[1].component_type, ComponentType::Diode);
        assert_eq!(ast.components[1].nodes, vec!["out", "0"]);
        assert_eq!(ast.components[1].model_ref.as_deref(), Some("DCLIP"));
    }

    #[test]
    fn test_parse_model() {
        let ast = parse(".model DCLIP D (is=1e-14 n=1.8)").unwrap();
        let model = &ast.models["DCLIP"];
        assert_eq!(model.model_type, ModelType::Diode);
        assert!((model.params["is"] - 1e-14).abs() < 1e-20);
    }

    #[test]
    fn test_parse_with_comments() {
        let input = "# This is a comment\nR1 in out 1k ; inline comment style\n";
        let ast = parse(input).unwrap();
        assert_eq!(ast.components.len(), 1);
    }

    #[test]
    fn test_precedence() {
        let (a, b, c) = (Expr::var("a"), Expr::var("b"), Expr::var("c"));
        assert_eq!(parse_expr("a + b*c").unwrap(), &a + &b * &c);
        assert_eq!(parse_expr("(a + b)*c").unwrap(), (&a + &b) * &c);
        assert_eq!(parse_expr("-a^2").unwrap(), -Expr::power(a.clone(), Expr::integer(2)));
        assert_eq!(parse_expr("a - b - c").unwrap(), &a - &b - &c);
        assert_eq!(
            parse_expr("a < b + 1").unwrap(),
            Expr::binary(BinaryOp::Less, a.clone(), &b + 1)
        );
    }

    #[test]
    fn test_calls() {
        let e = parse_expr("exp(x) + V_in(t0)").unwrap();
        let expected = Expr::call(builtins::exp(), [Expr::var("x")]) + delayed(&dependent("V_in"));
        assert_eq!(e, expected);

        assert!(parse_expr("exp(x, y)").is_err());
        assert!(parse_expr("a +").is_err());
        assert!(parse_expr("a b").is_err());
    }

    #[test]
    fn test_formulas_and_directives() {
        let input = "\
.state vin 0.5
.state vin_prev
.func gain(v) = 2*v
vout = gain(vin_prev)
.history vin vin_prev
.output vout vin
";
        let ast = parse(input).unwrap();
        assert_eq!(ast.states.len(), 2);
        assert_eq!(ast.states[0].initial, 0.5);
        assert_eq!(ast.states[1].initial, 0.0);
        assert_eq!(ast.formulas.len(), 1);
        assert_eq!(ast.formulas[0].unknown, Expr::var("vout"));
        assert_eq!(ast.history[0].previous, Expr::var("vin_prev"));
        assert_eq!(ast.outputs, vec![Expr::var("vout"), Expr::var("vin")]);
    }

    #[test]
    fn test_duplicate_formula() {
        let err = parse("y = 1\ny = 2").unwrap_err();
        assert!(matches!(err, AlgebraError::DuplicateFormula { line: 2, .. }));
    }

    #[test]
    fn test_unknown_component() {
        let err = parse("Q1 a b c").unwrap_err();
        assert!(matches!(err, AlgebraError::UnknownComponentType { .. }));
    }
}
