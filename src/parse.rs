//! The external parser boundary.
//!
//! Tokenizing and parsing ECMAScript source text is not this crate's job —
//! `boa_parser`/`boa_ast` own that (the same front end the Boa engine uses).
//! This module's only responsibility is calling into that parser and then
//! *lowering* its AST into `ast::Program` at the boundary. Nothing past this
//! file ever names a `boa_ast` type; the evaluator's input contract is
//! `ast::Program`, matching the "assume a standard ES-tree-shaped AST is
//! provided" framing from the specification.

use boa_ast::{
    Declaration as BDeclaration, Expression as BExpression, Statement as BStatement,
    StatementListItem as BItem,
    declaration::{Binding as BBinding, VarDeclaration as BVarDeclaration},
    expression::{
        Call as BCall, Identifier as BIdentifier, New as BNew,
        access::{PropertyAccess as BPropertyAccess, PropertyAccessField as BPropertyAccessField},
        literal::{Literal as BLiteral, TemplateLiteral as BTemplateLiteral},
        operator::{
            Assign as BAssign, Binary as BBinary, BinaryInPrivate as BBinaryInPrivate, Conditional as BConditional,
            Unary as BUnary, Update as BUpdate,
        },
    },
    function::{ClassDeclaration as BClassDecl, FormalParameterList, FunctionDeclaration as BFunctionDecl},
    statement::{Block as BBlock, ForLoop as BForLoop, If as BIf, Switch as BSwitch, Try as BTry, WhileLoop as BWhileLoop},
};
use boa_interner::{Interner, Sym};
use boa_parser::{Parser, Source};

use crate::{
    ast::{self, Expression, Pattern, Program, Statement},
    error::{CodeLoc, InterpreterError, ParseError},
};

/// Parses `source` into this crate's AST.
///
/// # Errors
/// Returns [`InterpreterError::Parse`] for malformed source, and
/// [`InterpreterError::Syntax`] for constructs `boa_parser` accepts but this
/// crate's lowering does not support (see module docs).
pub fn parse(source: &str) -> Result<Program, InterpreterError> {
    let mut interner = Interner::default();
    let boa_source = Source::from_bytes(source.as_bytes());
    let mut parser = Parser::new(boa_source);
    let script = parser.parse_script(&mut interner).map_err(|e| {
        InterpreterError::Parse(ParseError { message: e.to_string(), loc: CodeLoc::UNKNOWN })
    })?;

    let mut body = Vec::with_capacity(script.statements().len());
    for item in script.statements() {
        body.push(lower_item(item, &interner)?);
    }
    Ok(Program { body })
}

fn resolve(interner: &Interner, sym: Sym) -> String {
    interner.resolve_expect(sym).to_string()
}

fn lower_item(item: &BItem, i: &Interner) -> Result<Statement, InterpreterError> {
    match item {
        BItem::Statement(s) => lower_statement(s, i),
        BItem::Declaration(d) => lower_declaration(d, i),
    }
}

fn lower_block(items: &[BItem], i: &Interner) -> Result<Vec<Statement>, InterpreterError> {
    items.iter().map(|it| lower_item(it, i)).collect()
}

fn lower_declaration(d: &BDeclaration, i: &Interner) -> Result<Statement, InterpreterError> {
    match d {
        BDeclaration::Function(f) => lower_function_decl(f, i, false),
        BDeclaration::AsyncFunction(f) => lower_function_decl_async(f, i),
        BDeclaration::Generator(g) => lower_generator_decl(g, i),
        BDeclaration::AsyncGenerator(g) => lower_async_generator_decl(g, i),
        BDeclaration::Class(c) => lower_class_decl(c, i),
        BDeclaration::Lexical(l) => lower_var_decl(
            l.clone().into(),
            i,
            if l.is_const() { ast::DeclKind::Const } else { ast::DeclKind::Let },
        ),
    }
}

fn lower_function_decl(f: &BFunctionDecl, i: &Interner, is_async: bool) -> Result<Statement, InterpreterError> {
    let name = resolve(i, f.name().sym());
    let params = lower_params(f.parameters(), i)?;
    let body = lower_block(f.body().statement_list().statements(), i)?;
    Ok(Statement::FunctionDeclaration(ast::FunctionDecl {
        name,
        params,
        body,
        is_async,
        is_generator: false,
        loc: CodeLoc::UNKNOWN,
    }))
}

fn lower_function_decl_async(f: &boa_ast::function::AsyncFunctionDeclaration, i: &Interner) -> Result<Statement, InterpreterError> {
    let name = resolve(i, f.name().sym());
    let params = lower_params(f.parameters(), i)?;
    let body = lower_block(f.body().statement_list().statements(), i)?;
    Ok(Statement::FunctionDeclaration(ast::FunctionDecl {
        name,
        params,
        body,
        is_async: true,
        is_generator: false,
        loc: CodeLoc::UNKNOWN,
    }))
}

fn lower_generator_decl(f: &boa_ast::function::GeneratorDeclaration, i: &Interner) -> Result<Statement, InterpreterError> {
    let name = resolve(i, f.name().sym());
    let params = lower_params(f.parameters(), i)?;
    let body = lower_block(f.body().statement_list().statements(), i)?;
    Ok(Statement::FunctionDeclaration(ast::FunctionDecl {
        name,
        params,
        body,
        is_async: false,
        is_generator: true,
        loc: CodeLoc::UNKNOWN,
    }))
}

fn lower_async_generator_decl(f: &boa_ast::function::AsyncGeneratorDeclaration, i: &Interner) -> Result<Statement, InterpreterError> {
    let name = resolve(i, f.name().sym());
    let params = lower_params(f.parameters(), i)?;
    let body = lower_block(f.body().statement_list().statements(), i)?;
    Ok(Statement::FunctionDeclaration(ast::FunctionDecl {
        name,
        params,
        body,
        is_async: true,
        is_generator: true,
        loc: CodeLoc::UNKNOWN,
    }))
}

fn lower_class_decl(c: &BClassDecl, i: &Interner) -> Result<Statement, InterpreterError> {
    let name = c.name().map(|n| resolve(i, n.sym()));
    let superclass = c
        .super_ref()
        .map(|s| lower_expression(s, i))
        .transpose()?
        .map(Box::new);
    let mut members = Vec::new();
    for element in c.elements() {
        if let Some(member) = lower_class_element(element, i)? {
            members.push(member);
        }
    }
    Ok(Statement::ClassDeclaration(ast::ClassDecl {
        name,
        superclass,
        members,
        loc: CodeLoc::UNKNOWN,
    }))
}

fn lower_class_element(
    element: &boa_ast::function::ClassElement,
    i: &Interner,
) -> Result<Option<ast::ClassMember>, InterpreterError> {
    use boa_ast::function::ClassElement as CE;
    match element {
        CE::MethodDefinition(m) => {
            let kind = match m.kind() {
                boa_ast::function::ClassElementKind::Getter => ast::MethodKind::Get,
                boa_ast::function::ClassElementKind::Setter => ast::MethodKind::Set,
                _ if m.name().is_constructor(i) => ast::MethodKind::Constructor,
                _ => ast::MethodKind::Method,
            };
            let key = lower_property_name(m.name(), i)?;
            let function = ast::FunctionExpr {
                name: None,
                params: lower_params(m.parameters(), i)?,
                body: lower_block(m.body().statement_list().statements(), i)?,
                is_async: m.is_async(),
                is_generator: m.is_generator(),
                loc: CodeLoc::UNKNOWN,
            };
            Ok(Some(ast::ClassMember::Method { key, kind, is_static: m.is_static(), function }))
        }
        CE::FieldDefinition(field) => {
            let key = lower_property_name(field.name(), i)?;
            let value = field.field().map(|e| lower_expression(e, i)).transpose()?;
            Ok(Some(ast::ClassMember::Field { key, value, is_static: false }))
        }
        CE::StaticFieldDefinition(field) => {
            let key = lower_property_name(field.name(), i)?;
            let value = field.field().map(|e| lower_expression(e, i)).transpose()?;
            Ok(Some(ast::ClassMember::Field { key, value, is_static: true }))
        }
        _ => Ok(None),
    }
}

fn lower_property_name(name: &boa_ast::property::PropertyName, i: &Interner) -> Result<ast::PropertyKey, InterpreterError> {
    if let Some(sym) = name.literal() {
        if let Some(n) = sym.as_number() {
            return Ok(ast::PropertyKey::NumberLiteral(n));
        }
        return Ok(ast::PropertyKey::Identifier(resolve(i, sym.as_sym().unwrap_or_default())));
    }
    if let Some(expr) = name.computed() {
        return Ok(ast::PropertyKey::Computed(Box::new(lower_expression(expr, i)?)));
    }
    Err(InterpreterError::syntax("unsupported property name", CodeLoc::UNKNOWN))
}

fn lower_params(list: &FormalParameterList, i: &Interner) -> Result<Vec<Pattern>, InterpreterError> {
    let mut out = Vec::with_capacity(list.as_ref().len());
    for p in list.as_ref() {
        let base = lower_binding(p.variable().binding(), i)?;
        let with_default = if let Some(init) = p.variable().init() {
            Pattern::Assignment(Box::new(base), Box::new(lower_expression(init, i)?))
        } else {
            base
        };
        out.push(if p.is_rest_param() { Pattern::Rest(Box::new(with_default)) } else { with_default });
    }
    Ok(out)
}

fn lower_binding(b: &BBinding, i: &Interner) -> Result<Pattern, InterpreterError> {
    match b {
        BBinding::Identifier(id) => Ok(Pattern::Identifier(resolve(i, id.sym()))),
        BBinding::Pattern(p) => lower_declaration_pattern(p, i),
    }
}

fn lower_declaration_pattern(p: &boa_ast::declaration::Pattern, i: &Interner) -> Result<Pattern, InterpreterError> {
    use boa_ast::declaration::Pattern as BP;
    match p {
        BP::Object(obj) => {
            let mut props = Vec::new();
            let mut rest = None;
            for bp in obj.bindings() {
                use boa_ast::declaration::ObjectPatternElement as OPE;
                match bp {
                    OPE::SingleName { ident, name, default_init } => {
                        let key = lower_property_name(name, i)?;
                        let mut value = Pattern::Identifier(resolve(i, ident.sym()));
                        if let Some(init) = default_init {
                            value = Pattern::Assignment(Box::new(value), Box::new(lower_expression(init, i)?));
                        }
                        props.push(ast::ObjectPatternProp { key, value, shorthand: true });
                    }
                    OPE::RestProperty { ident } => {
                        rest = Some(Box::new(Pattern::Identifier(resolve(i, ident.sym()))));
                    }
                    OPE::Pattern { name, pattern, default_init } => {
                        let key = lower_property_name(name, i)?;
                        let mut value = lower_declaration_pattern(pattern, i)?;
                        if let Some(init) = default_init {
                            value = Pattern::Assignment(Box::new(value), Box::new(lower_expression(init, i)?));
                        }
                        props.push(ast::ObjectPatternProp { key, value, shorthand: false });
                    }
                    OPE::AssignmentRestPropertyAccess { .. } | OPE::AssignmentPropertyAccess { .. } => {
                        return Err(InterpreterError::syntax(
                            "member-expression destructuring targets are not supported in declarations",
                            CodeLoc::UNKNOWN,
                        ));
                    }
                }
            }
            Ok(Pattern::Object { props, rest })
        }
        BP::Array(arr) => {
            let mut elements = Vec::new();
            for el in arr.bindings() {
                use boa_ast::declaration::ArrayPatternElement as APE;
                elements.push(match el {
                    APE::Elision => None,
                    APE::SingleName { ident, default_init } => {
                        let mut value = Pattern::Identifier(resolve(i, ident.sym()));
                        if let Some(init) = default_init {
                            value = Pattern::Assignment(Box::new(value), Box::new(lower_expression(init, i)?));
                        }
                        Some(value)
                    }
                    APE::Pattern { pattern, default_init } => {
                        let mut value = lower_declaration_pattern(pattern, i)?;
                        if let Some(init) = default_init {
                            value = Pattern::Assignment(Box::new(value), Box::new(lower_expression(init, i)?));
                        }
                        Some(value)
                    }
                    APE::SingleNameRest { ident } => Some(Pattern::Rest(Box::new(Pattern::Identifier(resolve(i, ident.sym()))))),
                    APE::PatternRest { pattern } => Some(Pattern::Rest(Box::new(lower_declaration_pattern(pattern, i)?))),
                    APE::PropertyAccess { .. } | APE::PropertyAccessRest { .. } => {
                        return Err(InterpreterError::syntax(
                            "member-expression destructuring targets are not supported in declarations",
                            CodeLoc::UNKNOWN,
                        ));
                    }
                });
            }
            Ok(Pattern::Array(elements))
        }
    }
}

fn lower_var_decl(v: BVarDeclaration, i: &Interner, kind: ast::DeclKind) -> Result<Statement, InterpreterError> {
    let mut declarations = Vec::new();
    for d in v.0.as_ref() {
        let id = lower_binding(d.binding(), i)?;
        let init = d.init().map(|e| lower_expression(e, i)).transpose()?;
        declarations.push(ast::VariableDeclarator { id, init });
    }
    Ok(Statement::VariableDeclaration(ast::VariableDeclaration { kind, declarations, loc: CodeLoc::UNKNOWN }))
}

fn lower_statement(s: &BStatement, i: &Interner) -> Result<Statement, InterpreterError> {
    match s {
        BStatement::Var(v) => lower_var_decl(v.clone(), i, ast::DeclKind::Var),
        BStatement::Expression(e) => Ok(Statement::Expression(ast::ExpressionStatement {
            expr: lower_expression(e, i)?,
            loc: CodeLoc::UNKNOWN,
        })),
        BStatement::Block(b) => lower_block_stmt(b, i),
        BStatement::If(n) => lower_if(n, i),
        BStatement::WhileLoop(w) => lower_while(w, i),
        BStatement::DoWhileLoop(w) => Ok(Statement::DoWhile(ast::DoWhileStatement {
            body: Box::new(lower_statement(w.body(), i)?),
            test: lower_expression(w.cond(), i)?,
            loc: CodeLoc::UNKNOWN,
        })),
        BStatement::ForLoop(f) => lower_for(f, i),
        BStatement::ForInLoop(f) => lower_for_in(f, i),
        BStatement::ForOfLoop(f) => lower_for_of(f, i),
        BStatement::Switch(sw) => lower_switch(sw, i),
        BStatement::Continue(c) => Ok(Statement::Continue(ast::ContinueStatement {
            label: c.label().map(|l| resolve(i, l)),
            loc: CodeLoc::UNKNOWN,
        })),
        BStatement::Break(b) => Ok(Statement::Break(ast::BreakStatement {
            label: b.label().map(|l| resolve(i, l)),
            loc: CodeLoc::UNKNOWN,
        })),
        BStatement::Return(r) => Ok(Statement::Return(ast::ReturnStatement {
            argument: r.target().map(|e| lower_expression(e, i)).transpose()?,
            loc: CodeLoc::UNKNOWN,
        })),
        BStatement::Labelled(l) => Ok(Statement::Labeled(ast::LabeledStatement {
            label: resolve(i, l.label()),
            body: Box::new(lower_labelled_item(l.item(), i)?),
            loc: CodeLoc::UNKNOWN,
        })),
        BStatement::Throw(t) => Ok(Statement::Throw(ast::ThrowStatement {
            argument: lower_expression(t.target(), i)?,
            loc: CodeLoc::UNKNOWN,
        })),
        BStatement::Try(t) => lower_try(t, i),
        BStatement::Empty => Ok(Statement::Empty),
        _ => Err(InterpreterError::syntax("unsupported statement kind", CodeLoc::UNKNOWN)),
    }
}

fn lower_labelled_item(item: &boa_ast::statement::LabelledItem, i: &Interner) -> Result<Statement, InterpreterError> {
    match item {
        boa_ast::statement::LabelledItem::Statement(s) => lower_statement(s, i),
        boa_ast::statement::LabelledItem::Function(f) => lower_function_decl(f, i, false),
    }
}

fn lower_block_stmt(b: &BBlock, i: &Interner) -> Result<Statement, InterpreterError> {
    Ok(Statement::Block(ast::BlockStatement { body: lower_block(b.statement_list().statements(), i)?, loc: CodeLoc::UNKNOWN }))
}

fn lower_if(n: &BIf, i: &Interner) -> Result<Statement, InterpreterError> {
    Ok(Statement::If(ast::IfStatement {
        test: lower_expression(n.cond(), i)?,
        consequent: Box::new(lower_statement(n.body(), i)?),
        alternate: n.else_node().map(|e| lower_statement(e, i)).transpose()?.map(Box::new),
        loc: CodeLoc::UNKNOWN,
    }))
}

fn lower_while(w: &BWhileLoop, i: &Interner) -> Result<Statement, InterpreterError> {
    Ok(Statement::While(ast::WhileStatement {
        test: lower_expression(w.condition(), i)?,
        body: Box::new(lower_statement(w.body(), i)?),
        loc: CodeLoc::UNKNOWN,
    }))
}

fn lower_for(f: &BForLoop, i: &Interner) -> Result<Statement, InterpreterError> {
    let init = f
        .init()
        .map(|init| -> Result<ast::ForInit, InterpreterError> {
            use boa_ast::statement::ForLoopInitializer as FI;
            Ok(match init {
                FI::Expression(e) => ast::ForInit::Expr(lower_expression(e, i)?),
                FI::Var(v) => match lower_var_decl(v.clone(), i, ast::DeclKind::Var)? {
                    Statement::VariableDeclaration(d) => ast::ForInit::VarDecl(d),
                    _ => unreachable!(),
                },
                FI::Lexical(l) => {
                    let kind = if l.is_const() { ast::DeclKind::Const } else { ast::DeclKind::Let };
                    match lower_var_decl(l.clone().into(), i, kind)? {
                        Statement::VariableDeclaration(d) => ast::ForInit::VarDecl(d),
                        _ => unreachable!(),
                    }
                }
            })
        })
        .transpose()?;
    Ok(Statement::For(ast::ForStatement {
        init,
        test: f.condition().map(|e| lower_expression(e, i)).transpose()?,
        update: f.final_expr().map(|e| lower_expression(e, i)).transpose()?,
        body: Box::new(lower_statement(f.body(), i)?),
        loc: CodeLoc::UNKNOWN,
    }))
}

fn lower_for_target(
    init: &boa_ast::statement::IterableLoopInitializer,
    i: &Interner,
) -> Result<ast::ForTarget, InterpreterError> {
    use boa_ast::statement::IterableLoopInitializer as ILI;
    Ok(match init {
        ILI::Identifier(id) => ast::ForTarget::Pattern(Pattern::Identifier(resolve(i, id.sym()))),
        ILI::Var(b) => ast::ForTarget::Decl { kind: ast::DeclKind::Var, pattern: lower_binding(b, i)? },
        ILI::Let(b) => ast::ForTarget::Decl { kind: ast::DeclKind::Let, pattern: lower_binding(b, i)? },
        ILI::Const(b) => ast::ForTarget::Decl { kind: ast::DeclKind::Const, pattern: lower_binding(b, i)? },
        ILI::Pattern(p) => ast::ForTarget::Pattern(lower_declaration_pattern(p, i)?),
        ILI::AccessProperty(_) => {
            return Err(InterpreterError::syntax("member-expression for-loop targets are not supported", CodeLoc::UNKNOWN));
        }
    })
}

fn lower_for_in(f: &boa_ast::statement::ForInLoop, i: &Interner) -> Result<Statement, InterpreterError> {
    Ok(Statement::ForIn(ast::ForInStatement {
        left: lower_for_target(f.initializer(), i)?,
        right: lower_expression(f.target(), i)?,
        body: Box::new(lower_statement(f.body(), i)?),
        loc: CodeLoc::UNKNOWN,
    }))
}

fn lower_for_of(f: &boa_ast::statement::ForOfLoop, i: &Interner) -> Result<Statement, InterpreterError> {
    Ok(Statement::ForOf(ast::ForOfStatement {
        left: lower_for_target(f.initializer(), i)?,
        right: lower_expression(f.iterable(), i)?,
        body: Box::new(lower_statement(f.body(), i)?),
        is_await: f.r#await(),
        loc: CodeLoc::UNKNOWN,
    }))
}

fn lower_switch(sw: &BSwitch, i: &Interner) -> Result<Statement, InterpreterError> {
    let mut cases = Vec::new();
    for case in sw.cases() {
        cases.push(ast::SwitchCase {
            test: case.condition().map(|e| lower_expression(e, i)).transpose()?,
            consequent: lower_block(case.body().statements(), i)?,
        });
    }
    Ok(Statement::Switch(ast::SwitchStatement { discriminant: lower_expression(sw.val(), i)?, cases, loc: CodeLoc::UNKNOWN }))
}

fn lower_try(t: &BTry, i: &Interner) -> Result<Statement, InterpreterError> {
    let handler = t
        .catch()
        .map(|c| -> Result<ast::CatchClause, InterpreterError> {
            Ok(ast::CatchClause {
                param: c.parameter().map(|p| lower_binding(p, i)).transpose()?,
                body: lower_block(c.block().statement_list().statements(), i)?,
            })
        })
        .transpose()?;
    Ok(Statement::Try(ast::TryStatement {
        block: lower_block(t.block().statement_list().statements(), i)?,
        handler,
        finalizer: t
            .finally()
            .map(|f| lower_block(f.block().statement_list().statements(), i))
            .transpose()?,
        loc: CodeLoc::UNKNOWN,
    }))
}

fn lower_expression(e: &BExpression, i: &Interner) -> Result<Expression, InterpreterError> {
    let loc = CodeLoc::UNKNOWN;
    Ok(match e {
        BExpression::Identifier(id) => lower_identifier(*id, i),
        BExpression::This => Expression::This(loc),
        BExpression::Literal(l) => lower_literal(l, loc),
        BExpression::TemplateLiteral(t) => lower_template(t, i, loc)?,
        BExpression::ArrayLiteral(arr) => {
            let mut elements = Vec::new();
            for el in arr.as_ref() {
                elements.push(match el {
                    None => None,
                    Some(BExpression::Spread(s)) => Some(ast::Argument::Spread(lower_expression(s.target(), i)?)),
                    Some(expr) => Some(ast::Argument::Normal(lower_expression(expr, i)?)),
                });
            }
            Expression::Array(ast::ArrayExpr { elements, loc })
        }
        BExpression::ObjectLiteral(obj) => lower_object(obj, i, loc)?,
        BExpression::Spread(s) => Expression::Spread(Box::new(lower_expression(s.target(), i)?), loc),
        BExpression::FunctionExpression(f) => Expression::Function(ast::FunctionExpr {
            name: f.name().map(|n| resolve(i, n.sym())),
            params: lower_params(f.parameters(), i)?,
            body: lower_block(f.body().statement_list().statements(), i)?,
            is_async: false,
            is_generator: false,
            loc,
        }),
        BExpression::AsyncFunctionExpression(f) => Expression::Function(ast::FunctionExpr {
            name: f.name().map(|n| resolve(i, n.sym())),
            params: lower_params(f.parameters(), i)?,
            body: lower_block(f.body().statement_list().statements(), i)?,
            is_async: true,
            is_generator: false,
            loc,
        }),
        BExpression::GeneratorExpression(f) => Expression::Function(ast::FunctionExpr {
            name: f.name().map(|n| resolve(i, n.sym())),
            params: lower_params(f.parameters(), i)?,
            body: lower_block(f.body().statement_list().statements(), i)?,
            is_async: false,
            is_generator: true,
            loc,
        }),
        BExpression::AsyncGeneratorExpression(f) => Expression::Function(ast::FunctionExpr {
            name: f.name().map(|n| resolve(i, n.sym())),
            params: lower_params(f.parameters(), i)?,
            body: lower_block(f.body().statement_list().statements(), i)?,
            is_async: true,
            is_generator: true,
            loc,
        }),
        BExpression::ArrowFunction(a) => Expression::Arrow(ast::ArrowFunctionExpr {
            params: lower_params(a.parameters(), i)?,
            body: ast::ArrowBody::Block(lower_block(a.body().statement_list().statements(), i)?),
            is_async: false,
            loc,
        }),
        BExpression::AsyncArrowFunction(a) => Expression::Arrow(ast::ArrowFunctionExpr {
            params: lower_params(a.parameters(), i)?,
            body: ast::ArrowBody::Block(lower_block(a.body().statement_list().statements(), i)?),
            is_async: true,
            loc,
        }),
        BExpression::ClassExpression(c) => {
            let name = c.name().map(|n| resolve(i, n.sym()));
            let superclass = c.super_ref().map(|s| lower_expression(s, i)).transpose()?.map(Box::new);
            let mut members = Vec::new();
            for element in c.elements() {
                if let Some(m) = lower_class_element(element, i)? {
                    members.push(m);
                }
            }
            Expression::Class(ast::ClassDecl { name, superclass, members, loc })
        }
        BExpression::Unary(u) => lower_unary(u, i, loc)?,
        BExpression::Update(u) => lower_update(u, i, loc)?,
        BExpression::Binary(b) => lower_binary(b, i, loc)?,
        BExpression::BinaryInPrivate(b) => lower_binary_in_private(b, i, loc)?,
        BExpression::Conditional(c) => lower_conditional(c, i, loc)?,
        BExpression::Assign(a) => lower_assign(a, i, loc)?,
        BExpression::Call(c) => lower_call(c, i, loc)?,
        BExpression::New(n) => lower_new(n, i, loc)?,
        BExpression::PropertyAccess(p) => lower_property_access(p, i, loc)?,
        BExpression::Await(a) => Expression::Await(Box::new(lower_expression(a.target(), i)?), loc),
        BExpression::Yield(y) => Expression::Yield(ast::YieldExpr {
            argument: y.target().map(|e| lower_expression(e, i)).transpose()?.map(Box::new),
            delegate: y.delegate(),
            loc,
        }),
        BExpression::Parenthesized(p) => lower_expression(p.expression(), i)?,
        _ => return Err(InterpreterError::syntax("unsupported expression kind", loc)),
    })
}

fn lower_identifier(id: BIdentifier, i: &Interner) -> Expression {
    let name = resolve(i, id.sym());
    if let Some(stripped) = name.strip_prefix('#') {
        Expression::PrivateName(stripped.to_string(), CodeLoc::UNKNOWN)
    } else {
        Expression::Identifier(name, CodeLoc::UNKNOWN)
    }
}

fn lower_literal(l: &BLiteral, loc: CodeLoc) -> Expression {
    Expression::Literal(
        match l {
            BLiteral::Num(n) => ast::Literal::Number(*n),
            BLiteral::Int(n) => ast::Literal::Number(f64::from(*n)),
            BLiteral::BigInt(_) => ast::Literal::Number(f64::NAN),
            BLiteral::String(s) => ast::Literal::String(s.to_std_string_escaped()),
            BLiteral::Bool(b) => ast::Literal::Bool(*b),
            BLiteral::Null => ast::Literal::Null,
            BLiteral::Undefined => ast::Literal::Undefined,
        },
        loc,
    )
}

fn lower_template(t: &BTemplateLiteral, i: &Interner, loc: CodeLoc) -> Result<Expression, InterpreterError> {
    let mut quasis = Vec::new();
    let mut expressions = Vec::new();
    for element in t.elements() {
        use boa_ast::expression::literal::TemplateElement as TE;
        match element {
            TE::String(s) => quasis.push(resolve(i, *s)),
            TE::Expr(e) => expressions.push(lower_expression(e, i)?),
        }
    }
    Ok(Expression::TemplateLiteral(ast::TemplateLiteral { quasis, expressions, loc }))
}

fn lower_object(obj: &boa_ast::expression::literal::ObjectLiteral, i: &Interner, loc: CodeLoc) -> Result<Expression, InterpreterError> {
    use boa_ast::property::PropertyDefinition as PD;
    let mut properties = Vec::new();
    for prop in obj.properties() {
        properties.push(match prop {
            PD::IdentifierReference(id) => {
                let name = resolve(i, *id);
                ast::ObjectProperty::KeyValue {
                    key: ast::PropertyKey::Identifier(name.clone()),
                    value: Expression::Identifier(name, loc),
                    shorthand: true,
                }
            }
            PD::Property(name, value) => ast::ObjectProperty::KeyValue {
                key: lower_property_name(name, i)?,
                value: lower_expression(value, i)?,
                shorthand: false,
            },
            PD::MethodDefinition(m) => {
                let kind = match m.kind() {
                    boa_ast::function::ClassElementKind::Getter => ast::MethodKind::Get,
                    boa_ast::function::ClassElementKind::Setter => ast::MethodKind::Set,
                    _ => ast::MethodKind::Method,
                };
                ast::ObjectProperty::Method {
                    key: lower_property_name(m.name(), i)?,
                    kind,
                    function: ast::FunctionExpr {
                        name: None,
                        params: lower_params(m.parameters(), i)?,
                        body: lower_block(m.body().statement_list().statements(), i)?,
                        is_async: m.is_async(),
                        is_generator: m.is_generator(),
                        loc,
                    },
                }
            }
            PD::SpreadObject(e) => ast::ObjectProperty::Spread(lower_expression(e, i)?),
            PD::CoverInitializedName(..) => {
                return Err(InterpreterError::syntax("cover grammar initializers are not supported", loc));
            }
        });
    }
    Ok(Expression::Object(ast::ObjectExpr { properties, loc }))
}

fn lower_unary(u: &BUnary, i: &Interner, loc: CodeLoc) -> Result<Expression, InterpreterError> {
    use boa_ast::expression::operator::unary::UnaryOp as BOp;
    let op = match u.op() {
        BOp::Plus => ast::UnaryOp::Plus,
        BOp::Minus => ast::UnaryOp::Minus,
        BOp::Not => ast::UnaryOp::Not,
        BOp::Tilde => ast::UnaryOp::BitNot,
        BOp::TypeOf => ast::UnaryOp::Typeof,
        BOp::Void => ast::UnaryOp::Void,
        BOp::Delete => ast::UnaryOp::Delete,
        BOp::IncrementPre | BOp::IncrementPost | BOp::DecrementPre | BOp::DecrementPost => {
            return Err(InterpreterError::syntax("unexpected update operator in unary position", loc));
        }
    };
    Ok(Expression::Unary(ast::UnaryExpr { op, argument: Box::new(lower_expression(u.target(), i)?), loc }))
}

fn lower_update(u: &BUpdate, i: &Interner, loc: CodeLoc) -> Result<Expression, InterpreterError> {
    use boa_ast::expression::operator::update::UpdateOp as BOp;
    let (op, prefix) = match u.op() {
        BOp::IncrementPre => (ast::UpdateOp::Increment, true),
        BOp::IncrementPost => (ast::UpdateOp::Increment, false),
        BOp::DecrementPre => (ast::UpdateOp::Decrement, true),
        BOp::DecrementPost => (ast::UpdateOp::Decrement, false),
    };
    Ok(Expression::Update(ast::UpdateExpr { op, argument: Box::new(lower_expression(u.target(), i)?), prefix, loc }))
}

fn lower_binary(b: &BBinary, i: &Interner, loc: CodeLoc) -> Result<Expression, InterpreterError> {
    use boa_ast::expression::operator::binary::{
        ArithmeticOp, BitwiseOp, LogicalOp as BLogicalOp, RelationalOp,
    };
    use boa_ast::expression::operator::binary::BinaryOp as BOp;
    let left = Box::new(lower_expression(b.lhs(), i)?);
    let right = Box::new(lower_expression(b.rhs(), i)?);
    if let BOp::Logical(l) = b.op() {
        let op = match l {
            BLogicalOp::And => ast::LogicalOp::And,
            BLogicalOp::Or => ast::LogicalOp::Or,
            BLogicalOp::Coalesce => ast::LogicalOp::Nullish,
        };
        return Ok(Expression::Logical(ast::LogicalExpr { op, left, right, loc }));
    }
    let op = match b.op() {
        BOp::Arithmetic(a) => match a {
            ArithmeticOp::Add => ast::BinaryOp::Add,
            ArithmeticOp::Sub => ast::BinaryOp::Sub,
            ArithmeticOp::Mul => ast::BinaryOp::Mul,
            ArithmeticOp::Div => ast::BinaryOp::Div,
            ArithmeticOp::Mod => ast::BinaryOp::Mod,
            ArithmeticOp::Exp => ast::BinaryOp::Pow,
        },
        BOp::Bitwise(bop) => match bop {
            BitwiseOp::And => ast::BinaryOp::BitAnd,
            BitwiseOp::Or => ast::BinaryOp::BitOr,
            BitwiseOp::Xor => ast::BinaryOp::BitXor,
        },
        BOp::Relational(r) => match r {
            RelationalOp::Equal => ast::BinaryOp::Eq,
            RelationalOp::NotEqual => ast::BinaryOp::NotEq,
            RelationalOp::StrictEqual => ast::BinaryOp::StrictEq,
            RelationalOp::StrictNotEqual => ast::BinaryOp::StrictNotEq,
            RelationalOp::GreaterThan => ast::BinaryOp::Gt,
            RelationalOp::GreaterThanOrEqual => ast::BinaryOp::Ge,
            RelationalOp::LessThan => ast::BinaryOp::Lt,
            RelationalOp::LessThanOrEqual => ast::BinaryOp::Le,
            RelationalOp::In => ast::BinaryOp::In,
            RelationalOp::InstanceOf => ast::BinaryOp::Instanceof,
        },
        BOp::Comma => return Ok(Expression::Sequence(vec![*left, *right], loc)),
        BOp::Logical(_) => unreachable!("handled above"),
        BOp::Relation(_) => return Err(InterpreterError::syntax("private-name relation is not supported here", loc)),
    };
    Ok(Expression::Binary(ast::BinaryExpr { op, left, right, loc }))
}

fn lower_binary_in_private(b: &BBinaryInPrivate, i: &Interner, loc: CodeLoc) -> Result<Expression, InterpreterError> {
    // `#field in obj` — lowered as an `in` check against a synthesized private-name literal.
    Ok(Expression::Binary(ast::BinaryExpr {
        op: ast::BinaryOp::In,
        left: Box::new(Expression::PrivateName(resolve(i, b.lhs()), loc)),
        right: Box::new(lower_expression(b.rhs(), i)?),
        loc,
    }))
}

fn lower_conditional(c: &BConditional, i: &Interner, loc: CodeLoc) -> Result<Expression, InterpreterError> {
    Ok(Expression::Conditional(ast::ConditionalExpr {
        test: Box::new(lower_expression(c.condition(), i)?),
        consequent: Box::new(lower_expression(c.if_true(), i)?),
        alternate: Box::new(lower_expression(c.if_false(), i)?),
        loc,
    }))
}

fn lower_assign(a: &BAssign, i: &Interner, loc: CodeLoc) -> Result<Expression, InterpreterError> {
    use boa_ast::expression::operator::assign::AssignOp as BOp;
    use boa_ast::expression::operator::assign::AssignTarget as BTarget;
    let op = match a.op() {
        BOp::Assign => ast::AssignOp::Assign,
        BOp::Add => ast::AssignOp::Add,
        BOp::Sub => ast::AssignOp::Sub,
        BOp::Mul => ast::AssignOp::Mul,
        BOp::Div => ast::AssignOp::Div,
        BOp::Mod => ast::AssignOp::Mod,
        BOp::Exp => ast::AssignOp::Pow,
        BOp::Shl => ast::AssignOp::Shl,
        BOp::Shr => ast::AssignOp::Shr,
        BOp::Ushr => ast::AssignOp::UShr,
        BOp::And => ast::AssignOp::BitAnd,
        BOp::Or => ast::AssignOp::BitOr,
        BOp::Xor => ast::AssignOp::BitXor,
        BOp::BoolAnd => ast::AssignOp::And,
        BOp::BoolOr => ast::AssignOp::Or,
        BOp::Coalesce => ast::AssignOp::Nullish,
    };
    let target = match a.lhs() {
        BTarget::Identifier(id) => Pattern::Identifier(resolve(i, id.sym())),
        BTarget::Access(p) => Pattern::Member(lower_property_access_expr(p, i, loc)?),
        BTarget::Pattern(p) => lower_declaration_pattern(p, i)?,
    };
    Ok(Expression::Assignment(ast::AssignmentExpr { op, target, value: Box::new(lower_expression(a.rhs(), i)?), loc }))
}

fn lower_arguments(args: &[BExpression], i: &Interner) -> Result<Vec<ast::Argument>, InterpreterError> {
    let mut out = Vec::with_capacity(args.len());
    for a in args {
        out.push(match a {
            BExpression::Spread(s) => ast::Argument::Spread(lower_expression(s.target(), i)?),
            other => ast::Argument::Normal(lower_expression(other, i)?),
        });
    }
    Ok(out)
}

fn lower_call(c: &BCall, i: &Interner, loc: CodeLoc) -> Result<Expression, InterpreterError> {
    Ok(Expression::Call(ast::CallExpr {
        callee: Box::new(lower_expression(c.function(), i)?),
        arguments: lower_arguments(c.args(), i)?,
        optional: false,
        loc,
    }))
}

fn lower_new(n: &BNew, i: &Interner, loc: CodeLoc) -> Result<Expression, InterpreterError> {
    Ok(Expression::New(ast::NewExpr {
        callee: Box::new(lower_expression(n.call().function(), i)?),
        arguments: lower_arguments(n.call().args(), i)?,
        loc,
    }))
}

fn lower_property_access_expr(p: &BPropertyAccess, i: &Interner, loc: CodeLoc) -> Result<ast::MemberExpr, InterpreterError> {
    match p {
        BPropertyAccess::Simple(s) => {
            let object = Box::new(lower_expression(s.target(), i)?);
            Ok(match s.field() {
                BPropertyAccessField::Const(sym) => ast::MemberExpr {
                    object,
                    property: Box::new(lower_identifier(BIdentifier::new(*sym), i)),
                    computed: false,
                    optional: false,
                    loc,
                },
                BPropertyAccessField::Expr(e) => ast::MemberExpr {
                    object,
                    property: Box::new(lower_expression(e, i)?),
                    computed: true,
                    optional: false,
                    loc,
                },
            })
        }
        BPropertyAccess::Private(pr) => Ok(ast::MemberExpr {
            object: Box::new(lower_expression(pr.target(), i)?),
            property: Box::new(Expression::PrivateName(resolve(i, pr.field().description()), loc)),
            computed: false,
            optional: false,
            loc,
        }),
        BPropertyAccess::Super(s) => {
            let object = Box::new(Expression::Super(loc));
            Ok(match s.field() {
                BPropertyAccessField::Const(sym) => ast::MemberExpr {
                    object,
                    property: Box::new(lower_identifier(BIdentifier::new(*sym), i)),
                    computed: false,
                    optional: false,
                    loc,
                },
                BPropertyAccessField::Expr(e) => {
                    ast::MemberExpr { object, property: Box::new(lower_expression(e, i)?), computed: true, optional: false, loc }
                }
            })
        }
    }
}

fn lower_property_access(p: &BPropertyAccess, i: &Interner, loc: CodeLoc) -> Result<Expression, InterpreterError> {
    Ok(Expression::Member(lower_property_access_expr(p, i, loc)?))
}
