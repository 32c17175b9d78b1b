//! Recursive-descent parser for Prime source (spec.md §4.2).
//!
//! Produces the uniform `Program` tree. Operators are parsed with
//! precedence here and represented as `Call` nodes named by their raw
//! surface symbol (`"+"`, `"=="`, `"&&"`, ...); the later
//! `text_transform::rewrite_operators` pass renames them to their
//! semantic builtin names (`plus`, `equal`, `and`, ...) — by the time
//! that pass runs the tree is already correctly grouped, so it never
//! has to reason about precedence (spec.md §4.4).

use crate::lexer::{self, Token, TokenKind};
use prime_core::ast::Phase;
use prime_core::{Definition, Execution, Expr, Program, Span, Transform};

/// Primitive type names that trigger brace-constructor -> `convert<T>`
/// desugaring (spec.md §4.2).
const PRIMITIVE_TYPE_NAMES: &[&str] = &["i32", "i64", "u64", "bool", "f32", "f64", "int", "float"];

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Nested `name() { ... }` definitions collected while parsing a
    /// body; flushed into `Program::definitions` once the whole file
    /// has been parsed (spec.md §4.2 "Nested definitions").
    nested_definitions: Vec<Definition>,
}

impl Parser {
    pub fn new(source: &str) -> Result<Self, String> {
        let tokens = lexer::tokenize(source)?;
        Ok(Parser { tokens, pos: 0, nested_definitions: Vec::new() })
    }

    pub fn parse(&mut self) -> Result<Program, String> {
        let mut program = Program::new();
        loop {
            self.skip_seps();
            if self.at_eof() {
                break;
            }
            if self.check_ident("import") {
                program.imports.push(self.parse_import()?);
                continue;
            }

            let leading_transforms = if self.check_punct("[") {
                self.parse_transform_group()?
            } else {
                Vec::new()
            };

            let (name, span) = self.expect_ident_token()?;
            if self.check_punct("(") && self.paren_group_is_definition() {
                let def = self.parse_definition_rest(&name, "/", leading_transforms, span)?;
                program.definitions.push(def);
            } else if self.check_punct("(") {
                let (args, arg_names) = self.parse_arg_list()?;
                program.executions.push(Execution {
                    callee: name,
                    args,
                    arg_names,
                    transforms: leading_transforms,
                    span,
                });
            } else {
                return Err(format!(
                    "parse error at {}:{}: expected '(' after top-level name '{name}'",
                    span.line + 1,
                    span.column + 1
                ));
            }
        }
        program.definitions.extend(self.nested_definitions.drain(..));
        Ok(program)
    }

    // ---------------------------------------------------------------
    // token stream helpers
    // ---------------------------------------------------------------

    fn at_eof(&self) -> bool {
        matches!(self.tokens.get(self.pos).map(|t| &t.kind), Some(TokenKind::Eof) | None)
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn check_punct(&self, p: &str) -> bool {
        self.peek().is_punct(p)
    }

    fn check_operator(&self, op: &str) -> bool {
        self.peek().is_operator(op)
    }

    fn check_ident(&self, name: &str) -> bool {
        self.peek().is_ident(name)
    }

    fn is_ident_token(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Ident)
    }

    fn expect_punct(&mut self, p: &str) -> Result<(), String> {
        if self.check_punct(p) {
            self.advance();
            Ok(())
        } else {
            let tok = self.peek().clone();
            Err(format!(
                "parse error at {}:{}: expected '{p}', found '{}'",
                tok.line + 1,
                tok.column + 1,
                tok.text
            ))
        }
    }

    fn expect_ident_token(&mut self) -> Result<(String, Span), String> {
        if !self.is_ident_token() {
            let tok = self.peek().clone();
            return Err(format!(
                "parse error at {}:{}: expected identifier, found '{}'",
                tok.line + 1,
                tok.column + 1,
                tok.text
            ));
        }
        let tok = self.advance();
        Ok((tok.text, Span::new(tok.line, tok.column)))
    }

    /// Separators (`,`/`;`) are whitespace-equivalent everywhere lists
    /// are parsed (spec.md §4.2); skip any run of them.
    fn skip_seps(&mut self) {
        while self.check_punct(",") || self.check_punct(";") {
            self.advance();
        }
    }

    fn current_span(&self) -> Span {
        let t = self.peek();
        Span::new(t.line, t.column)
    }

    // ---------------------------------------------------------------
    // imports
    // ---------------------------------------------------------------

    fn parse_import(&mut self) -> Result<String, String> {
        self.advance(); // "import"
        let (path, _) = self.expect_ident_token()?;
        let mut full = path;
        if full.ends_with('/') && self.check_operator("*") {
            self.advance();
            full.push('*');
        }
        self.skip_seps();
        Ok(full)
    }

    // ---------------------------------------------------------------
    // transforms
    // ---------------------------------------------------------------

    fn parse_transform_group(&mut self) -> Result<Vec<Transform>, String> {
        self.expect_punct("[")?;
        let mut out = Vec::new();
        loop {
            self.skip_seps();
            if self.check_punct("]") {
                self.advance();
                break;
            }
            if self.at_eof() {
                return Err("unterminated transform list: missing ']'".to_string());
            }
            let is_phase_group = (self.check_ident("text") || self.check_ident("semantic"))
                && self.peek_at(1).map(|t| t.is_punct("(")).unwrap_or(false);
            if is_phase_group {
                let phase = if self.check_ident("text") { Phase::Text } else { Phase::Semantic };
                self.advance();
                self.advance(); // "("
                loop {
                    self.skip_seps();
                    if self.check_punct(")") {
                        self.advance();
                        break;
                    }
                    out.push(self.parse_single_transform(phase)?);
                    self.skip_seps();
                }
            } else {
                out.push(self.parse_single_transform(Phase::Semantic)?);
            }
            self.skip_seps();
        }
        Ok(out)
    }

    fn parse_single_transform(&mut self, phase: Phase) -> Result<Transform, String> {
        let (name, _) = self.expect_ident_token()?;
        let mut transform = Transform::new(name, phase);
        if self.check_punct("<") {
            transform.template_args = self.parse_template_args()?;
        }
        if self.check_punct("(") {
            self.advance();
            loop {
                self.skip_seps();
                if self.check_punct(")") {
                    self.advance();
                    break;
                }
                transform.arguments.push(self.parse_expr()?);
                self.skip_seps();
            }
        }
        Ok(transform)
    }

    /// Parses a `<T1,T2>` list of raw type-argument texts.
    fn parse_template_args(&mut self) -> Result<Vec<String>, String> {
        self.expect_punct("<")?;
        let mut out = Vec::new();
        loop {
            self.skip_seps();
            if self.check_punct(">") {
                self.advance();
                break;
            }
            if self.at_eof() {
                return Err("unterminated template argument list: missing '>'".to_string());
            }
            let (text, _) = self.expect_ident_token()?;
            out.push(text);
            self.skip_seps();
        }
        Ok(out)
    }

    /// Returns true when the token at `self.pos` (a `"<"`) begins a
    /// template-argument list that is immediately followed by `(`,
    /// distinguishing `array<i32>(4i32)` from a relational `a < b`
    /// used as a primary. Performs a save/restore lookahead.
    fn looks_like_template_args(&mut self) -> bool {
        let save = self.pos;
        let ok = self.parse_template_args().is_ok() && self.check_punct("(");
        self.pos = save;
        ok
    }

    // ---------------------------------------------------------------
    // definitions vs. executions/calls
    // ---------------------------------------------------------------

    /// Scans forward from the current `(` token to its matching `)`
    /// and checks whether a `{` follows — the rule that decides
    /// whether `name(...)` is a definition or an execution/call
    /// (spec.md §4.2: executions are calls NOT followed by `{...}`).
    fn paren_group_is_definition(&self) -> bool {
        let mut depth: i32 = 0;
        let mut i = self.pos;
        loop {
            match self.tokens.get(i) {
                None => return false,
                Some(t) if t.is_punct("(") => {
                    depth += 1;
                    i += 1;
                }
                Some(t) if t.is_punct(")") => {
                    depth -= 1;
                    if depth == 0 {
                        return self.tokens.get(i + 1).map(|n| n.is_punct("{")).unwrap_or(false);
                    }
                    i += 1;
                }
                Some(t) if matches!(t.kind, TokenKind::Eof) => return false,
                _ => i += 1,
            }
        }
    }

    fn parse_definition_rest(
        &mut self,
        name: &str,
        namespace: &str,
        transforms: Vec<Transform>,
        span: Span,
    ) -> Result<Definition, String> {
        let template_params = if self.check_punct("<") && self.looks_like_template_args() {
            self.parse_template_args()?
        } else {
            Vec::new()
        };
        let params = self.parse_param_list()?;
        self.expect_punct("{")?;

        let full_path = if namespace == "/" { format!("/{name}") } else { format!("{namespace}/{name}") };
        let child_namespace = full_path.clone();

        let mut statements = Vec::new();
        let mut return_expr = None;
        loop {
            self.skip_seps();
            if self.check_punct("}") {
                self.advance();
                break;
            }
            if self.at_eof() {
                return Err(format!("unterminated definition body for '{full_path}': missing '}}'"));
            }
            if self.is_ident_token()
                && self.peek().text == "return"
                && self.peek_at(1).map(|t| t.is_punct("(")).unwrap_or(false)
            {
                self.advance();
                let (mut args, _) = self.parse_arg_list()?;
                return_expr = Some(if args.is_empty() { Expr::call("void", Vec::new(), span) } else { args.remove(0) });
                continue;
            }
            statements.push(self.parse_statement(&child_namespace)?);
        }

        Ok(Definition { full_path, namespace: namespace.to_string(), params, statements, return_expr, transforms, template_params })
    }

    fn parse_param_list(&mut self) -> Result<Vec<Expr>, String> {
        self.expect_punct("(")?;
        let mut params = Vec::new();
        loop {
            self.skip_seps();
            if self.check_punct(")") {
                self.advance();
                break;
            }
            if self.at_eof() {
                return Err("unterminated parameter list: missing ')'".to_string());
            }
            let transforms = if self.check_punct("[") { self.parse_transform_group()? } else { Vec::new() };
            let (name, span) = self.expect_ident_token()?;
            params.push(Expr::Call {
                name: "param".to_string(),
                args: Vec::new(),
                arg_names: Vec::new(),
                template_args: Vec::new(),
                transforms,
                body_arguments: Vec::new(),
                is_binding: false,
                is_method_call: false,
                is_lambda: false,
                binding_name: Some(name),
                lambda_captures: Vec::new(),
                span,
            });
            self.skip_seps();
        }
        Ok(params)
    }

    fn parse_arg_list(&mut self) -> Result<(Vec<Expr>, Vec<Option<String>>), String> {
        self.expect_punct("(")?;
        let mut args = Vec::new();
        let mut names = Vec::new();
        loop {
            self.skip_seps();
            if self.check_punct(")") {
                self.advance();
                break;
            }
            if self.at_eof() {
                return Err("unterminated argument list: missing ')'".to_string());
            }
            let label = if self.is_ident_token() && self.peek_at(1).map(|t| t.is_punct(":")).unwrap_or(false) {
                let (label_name, _) = self.expect_ident_token()?;
                self.advance(); // ":"
                Some(label_name)
            } else {
                None
            };
            args.push(self.parse_expr()?);
            names.push(label);
            self.skip_seps();
        }
        Ok((args, names))
    }

    // ---------------------------------------------------------------
    // statements
    // ---------------------------------------------------------------

    fn parse_statement(&mut self, namespace: &str) -> Result<Expr, String> {
        if self.check_punct("[") {
            let transforms = self.parse_transform_group()?;
            let (name, span) = self.expect_ident_token()?;
            if self.check_punct("{") {
                return self.parse_binding_rest(&name, transforms, span);
            }
            if self.check_punct("(") && self.paren_group_is_definition() {
                let def = self.parse_definition_rest(&name, namespace, transforms, span)?;
                self.nested_definitions.push(def);
                return Ok(Expr::call("void", Vec::new(), span));
            }
            if self.check_punct("(") {
                let (args, arg_names) = self.parse_arg_list()?;
                let mut call = Expr::call(&name, args, span);
                if let Expr::Call { arg_names: names_slot, transforms: t_slot, .. } = &mut call {
                    *names_slot = arg_names;
                    *t_slot = transforms;
                }
                return self.parse_postfix(call);
            }
            return Err(format!(
                "parse error at {}:{}: expected '(' or '{{' after transformed name '{name}'",
                span.line + 1,
                span.column + 1
            ));
        }

        if self.check_ident("if") {
            return self.parse_if();
        }
        if self.check_ident("loop") || self.check_ident("while") || self.check_ident("for") || self.check_ident("repeat") {
            let kind = self.advance().text;
            return self.parse_loop(&kind);
        }
        if self.check_ident("return") && self.peek_at(1).map(|t| t.is_punct("(")).unwrap_or(false) {
            let span = self.current_span();
            self.advance();
            let (mut args, _) = self.parse_arg_list()?;
            let value = if args.is_empty() { Expr::call("void", Vec::new(), span) } else { args.remove(0) };
            return Ok(Expr::call("return", vec![value], span));
        }

        if self.is_ident_token() && self.peek_at(1).map(|t| t.is_punct("{")).unwrap_or(false) {
            let (name, span) = self.expect_ident_token()?;
            return self.parse_binding_rest(&name, Vec::new(), span);
        }

        if self.is_ident_token() && self.peek_at(1).map(|t| t.is_punct("(")).unwrap_or(false) {
            let save = self.pos;
            let (name, span) = self.expect_ident_token()?;
            if self.paren_group_is_definition() {
                let def = self.parse_definition_rest(&name, namespace, Vec::new(), span)?;
                self.nested_definitions.push(def);
                return Ok(Expr::call("void", Vec::new(), span));
            }
            self.pos = save;
        }

        self.parse_expr()
    }

    fn parse_binding_rest(&mut self, name: &str, type_transforms: Vec<Transform>, span: Span) -> Result<Expr, String> {
        self.expect_punct("{")?;
        let mut stmts = Vec::new();
        loop {
            self.skip_seps();
            if self.check_punct("}") {
                self.advance();
                break;
            }
            if self.at_eof() {
                return Err(format!("unterminated binding initializer for '{name}': missing '}}'"));
            }
            stmts.push(self.parse_statement("/")?);
            self.skip_seps();
        }
        let init = if stmts.len() == 1 {
            stmts.into_iter().next().unwrap()
        } else if stmts.is_empty() {
            Expr::call("void", Vec::new(), span)
        } else {
            Expr::envelope("block", stmts, span)
        };
        Ok(Expr::Call {
            name: "bind".to_string(),
            args: vec![init],
            arg_names: vec![None],
            template_args: Vec::new(),
            transforms: type_transforms,
            body_arguments: Vec::new(),
            is_binding: true,
            is_method_call: false,
            is_lambda: false,
            binding_name: Some(name.to_string()),
            lambda_captures: Vec::new(),
            span,
        })
    }

    fn parse_block_body(&mut self) -> Result<Vec<Expr>, String> {
        self.expect_punct("{")?;
        let mut stmts = Vec::new();
        loop {
            self.skip_seps();
            if self.check_punct("}") {
                self.advance();
                break;
            }
            if self.at_eof() {
                return Err("unterminated block: missing '}'".to_string());
            }
            stmts.push(self.parse_statement("/")?);
            self.skip_seps();
        }
        Ok(stmts)
    }

    fn parse_if(&mut self) -> Result<Expr, String> {
        let span = self.current_span();
        self.advance(); // "if"
        self.expect_punct("(")?;
        let cond = self.parse_expr()?;
        self.expect_punct(")")?;
        let then_body = self.parse_block_body()?;
        let mut body_arguments = vec![Expr::envelope("then", then_body, span)];
        self.skip_seps();
        if self.check_ident("else") {
            self.advance();
            let else_body = self.parse_block_body()?;
            body_arguments.push(Expr::envelope("else", else_body, span));
        }
        Ok(Expr::Call {
            name: "if".to_string(),
            args: vec![cond],
            arg_names: vec![None],
            template_args: Vec::new(),
            transforms: Vec::new(),
            body_arguments,
            is_binding: false,
            is_method_call: false,
            is_lambda: false,
            binding_name: None,
            lambda_captures: Vec::new(),
            span,
        })
    }

    fn parse_loop(&mut self, kind: &str) -> Result<Expr, String> {
        let span = self.current_span();
        let (args, arg_names) = self.parse_arg_list()?;
        let body = self.parse_block_body()?;
        Ok(Expr::Call {
            name: kind.to_string(),
            args,
            arg_names,
            template_args: Vec::new(),
            transforms: Vec::new(),
            body_arguments: vec![Expr::envelope("body", body, span)],
            is_binding: false,
            is_method_call: false,
            is_lambda: false,
            binding_name: None,
            lambda_captures: Vec::new(),
            span,
        })
    }

    // ---------------------------------------------------------------
    // expressions: precedence climbing, operators kept as raw-symbol Calls
    // ---------------------------------------------------------------

    pub fn parse_expr(&mut self) -> Result<Expr, String> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> Result<Expr, String> {
        let lhs = self.parse_or()?;
        if self.check_operator("=") {
            let span = self.current_span();
            self.advance();
            let rhs = self.parse_assignment()?;
            return Ok(Expr::call("=", vec![lhs, rhs], span));
        }
        Ok(lhs)
    }

    fn parse_or(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_and()?;
        while self.check_operator("||") {
            let span = self.current_span();
            self.advance();
            let rhs = self.parse_and()?;
            lhs = Expr::call("||", vec![lhs, rhs], span);
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_equality()?;
        while self.check_operator("&&") {
            let span = self.current_span();
            self.advance();
            let rhs = self.parse_equality()?;
            lhs = Expr::call("&&", vec![lhs, rhs], span);
        }
        Ok(lhs)
    }

    fn parse_equality(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_relational()?;
        loop {
            let op = if self.check_operator("==") {
                "=="
            } else if self.check_operator("!=") {
                "!="
            } else {
                break;
            };
            let span = self.current_span();
            self.advance();
            let rhs = self.parse_relational()?;
            lhs = Expr::call(op, vec![lhs, rhs], span);
        }
        Ok(lhs)
    }

    fn parse_relational(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_additive()?;
        loop {
            let op = if self.check_operator("<=") {
                "<="
            } else if self.check_operator(">=") {
                ">="
            } else if self.check_operator("<") {
                "<"
            } else if self.check_operator(">") {
                ">"
            } else {
                break;
            };
            let span = self.current_span();
            self.advance();
            let rhs = self.parse_additive()?;
            lhs = Expr::call(op, vec![lhs, rhs], span);
        }
        Ok(lhs)
    }

    fn parse_additive(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_multiplicative()?;
        loop {
            let op = if self.check_operator("+") {
                "+"
            } else if self.check_operator("-") {
                "-"
            } else {
                break;
            };
            let span = self.current_span();
            self.advance();
            let rhs = self.parse_multiplicative()?;
            lhs = Expr::call(op, vec![lhs, rhs], span);
        }
        Ok(lhs)
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, String> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = if self.check_operator("*") {
                "*"
            } else if self.check_operator("/") {
                "/"
            } else {
                break;
            };
            let span = self.current_span();
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr::call(op, vec![lhs, rhs], span);
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, String> {
        let span = self.current_span();
        if self.check_operator("!") {
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expr::call("!", vec![operand], span));
        }
        if self.check_operator("-") {
            self.advance();
            let operand = self.parse_unary()?;
            // Unary minus on a literal folds directly into the literal's
            // value rather than producing a `negate(...)` call (spec.md §4.4).
            return Ok(match operand {
                Expr::Literal { value, width, signed, span } => Expr::Literal { value: -value, width, signed, span },
                Expr::FloatLiteral { text, width, span } => {
                    let negated = match text.strip_prefix('-') {
                        Some(stripped) => stripped.to_string(),
                        None => format!("-{text}"),
                    };
                    Expr::FloatLiteral { text: negated, width, span }
                }
                other => Expr::call("-", vec![other], span),
            });
        }
        if self.check_operator("&") {
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expr::call("location", vec![operand], span));
        }
        if self.check_operator("*") {
            self.advance();
            let operand = self.parse_unary()?;
            return Ok(Expr::call("dereference", vec![operand], span));
        }
        self.parse_postfix_from_primary()
    }

    fn parse_postfix_from_primary(&mut self) -> Result<Expr, String> {
        let primary = self.parse_primary()?;
        self.parse_postfix(primary)
    }

    fn parse_postfix(&mut self, mut expr: Expr) -> Result<Expr, String> {
        loop {
            if self.check_punct(".") && self.peek_at(1).map(|t| matches!(t.kind, TokenKind::Ident)).unwrap_or(false) {
                let span = self.current_span();
                self.advance(); // "."
                let (name, _) = self.expect_ident_token()?;
                let (mut args, mut names) = self.parse_arg_list()?;
                args.insert(0, expr);
                names.insert(0, None);
                expr = Expr::Call {
                    name,
                    args,
                    arg_names: names,
                    template_args: Vec::new(),
                    transforms: Vec::new(),
                    body_arguments: Vec::new(),
                    is_binding: false,
                    is_method_call: true,
                    is_lambda: false,
                    binding_name: None,
                    lambda_captures: Vec::new(),
                    span,
                };
            } else if self.check_punct("[") {
                let span = self.current_span();
                self.advance();
                let index = self.parse_expr()?;
                self.expect_punct("]")?;
                expr = Expr::call("at", vec![expr, index], span);
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, String> {
        let span = self.current_span();
        match self.peek().kind.clone() {
            TokenKind::Int { value, width, signed } => {
                self.advance();
                Ok(Expr::Literal { value, width, signed, span })
            }
            TokenKind::Float { text, width } => {
                self.advance();
                Ok(Expr::FloatLiteral { text, width, span })
            }
            TokenKind::Bool(b) => {
                self.advance();
                Ok(Expr::BoolLiteral { value: b, span })
            }
            TokenKind::Str { value, suffix } => {
                self.advance();
                Ok(Expr::StringLiteral { value, suffix, span })
            }
            TokenKind::Punct if self.check_punct("(") => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect_punct(")")?;
                Ok(inner)
            }
            TokenKind::Punct if self.check_punct("[") => self.parse_lambda(),
            TokenKind::Ident => self.parse_ident_primary(),
            _ => {
                let tok = self.peek().clone();
                Err(format!("parse error at {}:{}: unexpected token '{}'", tok.line + 1, tok.column + 1, tok.text))
            }
        }
    }

    fn parse_ident_primary(&mut self) -> Result<Expr, String> {
        let (name, span) = self.expect_ident_token()?;

        if self.check_punct("<") && self.looks_like_template_args() {
            let template_args = self.parse_template_args()?;
            let (args, arg_names) = self.parse_arg_list()?;
            return Ok(Expr::Call {
                name,
                args,
                arg_names,
                template_args,
                transforms: Vec::new(),
                body_arguments: Vec::new(),
                is_binding: false,
                is_method_call: false,
                is_lambda: false,
                binding_name: None,
                lambda_captures: Vec::new(),
                span,
            });
        }

        if self.check_punct("(") {
            let (args, arg_names) = self.parse_arg_list()?;
            let mut call = Expr::call(&name, args, span);
            if let Expr::Call { arg_names: names_slot, .. } = &mut call {
                *names_slot = arg_names;
            }
            return Ok(call);
        }

        if self.check_punct("{") {
            // Brace constructor: `Name{args}`; primitive type names desugar
            // to `convert<T>(...)` (spec.md §4.2).
            self.advance();
            let mut args = Vec::new();
            loop {
                self.skip_seps();
                if self.check_punct("}") {
                    self.advance();
                    break;
                }
                if self.at_eof() {
                    return Err(format!("unterminated brace constructor for '{name}': missing '}}'"));
                }
                args.push(self.parse_expr()?);
                self.skip_seps();
            }
            let arg_names = vec![None; args.len()];
            if PRIMITIVE_TYPE_NAMES.contains(&name.as_str()) {
                return Ok(Expr::Call {
                    name: "convert".to_string(),
                    args,
                    arg_names,
                    template_args: vec![name],
                    transforms: Vec::new(),
                    body_arguments: Vec::new(),
                    is_binding: false,
                    is_method_call: false,
                    is_lambda: false,
                    binding_name: None,
                    lambda_captures: Vec::new(),
                    span,
                });
            }
            return Ok(Expr::Call {
                name,
                args,
                arg_names,
                template_args: Vec::new(),
                transforms: Vec::new(),
                body_arguments: Vec::new(),
                is_binding: false,
                is_method_call: false,
                is_lambda: false,
                binding_name: None,
                lambda_captures: Vec::new(),
                span,
            });
        }

        let (namespace, bare) = match name.rsplit_once('/') {
            Some((ns, leaf)) if !leaf.is_empty() => (Some(format!("{ns}/")), leaf.to_string()),
            _ => (None, name),
        };
        Ok(Expr::Name { namespace, name: bare, span })
    }

    fn parse_lambda(&mut self) -> Result<Expr, String> {
        let span = self.current_span();
        self.expect_punct("[")?;
        let mut captures = Vec::new();
        loop {
            self.skip_seps();
            if self.check_punct("]") {
                self.advance();
                break;
            }
            if self.at_eof() {
                return Err("unterminated lambda capture list: missing ']'".to_string());
            }
            if self.check_operator("=") {
                self.advance();
                captures.push("=".to_string());
            } else if self.check_operator("&") {
                self.advance();
                captures.push("&".to_string());
            } else if self.check_ident("ref") {
                self.advance();
                let (name, _) = self.expect_ident_token()?;
                captures.push(format!("ref {name}"));
            } else {
                let (name, _) = self.expect_ident_token()?;
                captures.push(name);
            }
            self.skip_seps();
        }

        let params = if self.check_punct("(") { self.parse_param_list()? } else { Vec::new() };
        let body = self.parse_block_body()?;
        let arg_names = vec![None; params.len()];
        Ok(Expr::Call {
            name: "lambda".to_string(),
            args: params,
            arg_names,
            template_args: Vec::new(),
            transforms: Vec::new(),
            body_arguments: body,
            is_binding: false,
            is_method_call: false,
            is_lambda: true,
            binding_name: None,
            lambda_captures: captures,
            span,
        })
    }
}

pub fn parse_program(source: &str) -> Result<Program, String> {
    Parser::new(source)?.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_entry_definition() {
        let program = parse_program("main() { return(1i32) }").unwrap();
        assert_eq!(program.definitions.len(), 1);
        let def = &program.definitions[0];
        assert_eq!(def.full_path, "/main");
        match &def.return_expr {
            Some(Expr::Literal { value: 1, width: 32, signed: true, .. }) => {}
            other => panic!("unexpected return_expr {other:?}"),
        }
    }

    #[test]
    fn parses_operator_as_raw_symbol_call_respecting_precedence() {
        let program2 = parse_program("main() { return(1i32 + 2i32 * 3i32) }").unwrap();
        let def2 = &program2.definitions[0];
        match def2.return_expr.as_ref().unwrap() {
            Expr::Call { name, args, .. } => {
                assert_eq!(name, "+");
                match &args[1] {
                    Expr::Call { name, .. } => assert_eq!(name, "*"),
                    other => panic!("expected nested '*' call, got {other:?}"),
                }
            }
            other => panic!("expected '+' call, got {other:?}"),
        }
    }

    #[test]
    fn unary_minus_on_literal_folds_directly() {
        let program = parse_program("main() { return(-5i32) }").unwrap();
        match program.definitions[0].return_expr.as_ref().unwrap() {
            Expr::Literal { value, .. } => assert_eq!(*value, -5),
            other => panic!("expected folded literal, got {other:?}"),
        }
    }

    #[test]
    fn unary_minus_on_non_literal_produces_raw_marker_call() {
        let program = parse_program("main([i32] x) { return(-x) }").unwrap();
        match program.definitions[0].return_expr.as_ref().unwrap() {
            Expr::Call { name, args, .. } => {
                assert_eq!(name, "-");
                assert_eq!(args.len(), 1);
            }
            other => panic!("expected unary '-' call, got {other:?}"),
        }
    }

    #[test]
    fn method_call_sugar_prepends_receiver() {
        let program = parse_program("main([array<string>] args) { return(args.count()) }").unwrap();
        match program.definitions[0].return_expr.as_ref().unwrap() {
            Expr::Call { name, args, is_method_call, .. } => {
                assert_eq!(name, "count");
                assert!(is_method_call);
                assert_eq!(args.len(), 1);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn index_sugar_lowers_to_at_call() {
        let program = parse_program("main([array<i32>] v) { return(v[0i32]) }").unwrap();
        match program.definitions[0].return_expr.as_ref().unwrap() {
            Expr::Call { name, args, .. } => {
                assert_eq!(name, "at");
                assert_eq!(args.len(), 2);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn pointer_sugar_produces_location_and_dereference() {
        let program = parse_program("main() { [i32] x{1i32} [Pointer<i32>] p{&x} return(*p) }").unwrap();
        let def = &program.definitions[0];
        match &def.statements[1] {
            Expr::Call { binding_name, args, .. } => {
                assert_eq!(binding_name.as_deref(), Some("p"));
                match &args[0] {
                    Expr::Call { name, .. } => assert_eq!(name, "location"),
                    other => panic!("expected location() call, got {other:?}"),
                }
            }
            other => panic!("unexpected statement {other:?}"),
        }
        match def.return_expr.as_ref().unwrap() {
            Expr::Call { name, .. } => assert_eq!(name, "dereference"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn if_else_sugar_builds_then_else_envelopes() {
        let program =
            parse_program("main() { if(equal(1i32, 1i32)) { return(1i32) } else { return(0i32) } return(2i32) }").unwrap();
        let def = &program.definitions[0];
        match &def.statements[0] {
            Expr::Call { name, body_arguments, .. } => {
                assert_eq!(name, "if");
                assert_eq!(body_arguments.len(), 2);
                assert!(body_arguments[0].is_envelope());
                assert!(body_arguments[1].is_envelope());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn loop_forms_require_block_envelope_bodies() {
        let program = parse_program("main() { loop(3i32) { print_line(\"hi\"utf8) } return(0i32) }").unwrap();
        match &program.definitions[0].statements[0] {
            Expr::Call { name, body_arguments, .. } => {
                assert_eq!(name, "loop");
                assert_eq!(body_arguments.len(), 1);
                assert!(body_arguments[0].is_envelope());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn bindings_parse_bare_and_with_type_transforms() {
        let program = parse_program("main() { x{1i32} [mut] y{2i32} return(x) }").unwrap();
        let def = &program.definitions[0];
        assert!(matches!(&def.statements[0], Expr::Call { is_binding: true, binding_name: Some(n), .. } if n == "x"));
        match &def.statements[1] {
            Expr::Call { is_binding: true, binding_name: Some(n), transforms, .. } => {
                assert_eq!(n, "y");
                assert_eq!(transforms[0].name, "mut");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn nested_definitions_are_collected_with_full_path() {
        let program = parse_program("main() { helper() { return(1i32) } return(helper()) }").unwrap();
        assert!(program.definitions.iter().any(|d| d.full_path == "/main/helper"));
    }

    #[test]
    fn executions_are_top_level_calls_without_trailing_block() {
        let program = parse_program("main() { return(0i32) } main()").unwrap();
        assert_eq!(program.executions.len(), 1);
        assert_eq!(program.executions[0].callee, "main");
    }

    #[test]
    fn lambda_capture_only_forms_parse() {
        let program = parse_program("main() { [f] quote{[=](){ return(1i32) }} return(0i32) }").unwrap();
        match &program.definitions[0].statements[0] {
            Expr::Call { args, .. } => match &args[0] {
                Expr::Call { is_lambda, lambda_captures, .. } => {
                    assert!(is_lambda);
                    assert_eq!(lambda_captures, &vec!["=".to_string()]);
                }
                other => panic!("unexpected initializer {other:?}"),
            },
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn generic_collection_constructors_parse_template_args() {
        let program = parse_program("main() { [array<i32>] v{array<i32>(4i32)} return(count(v)) }").unwrap();
        match &program.definitions[0].statements[0] {
            Expr::Call { args, .. } => match &args[0] {
                Expr::Call { name, template_args, .. } => {
                    assert_eq!(name, "array");
                    assert_eq!(template_args, &vec!["i32".to_string()]);
                }
                other => panic!("unexpected {other:?}"),
            },
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn import_statement_supports_wildcard() {
        let program = parse_program("import /math/* main() { return(0i32) }").unwrap();
        assert_eq!(program.imports, vec!["/math/*".to_string()]);
    }

    #[test]
    fn unterminated_transform_list_is_an_error() {
        let err = parse_program("[return<int> main() { return(0i32) }").unwrap_err();
        assert!(err.contains("unterminated"));
    }
}
