// Lua syntax tree for generated source
//
// Generated code is assembled as a tree of statements and expressions and
// rendered in one pass. Indentation is a property of the render depth, so
// nested blocks produced by different strategies compose without any manual
// re-indentation.

use std::fmt::Write;

use crate::graph::module::Module;

/// Spaces per indentation level
pub const INDENT: &str = "    ";

fn indent(depth: usize) -> String {
    INDENT.repeat(depth)
}

/// A Lua expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Verbatim expression text, such as an identifier
    Raw(String),
    /// Quoted string literal
    Str(String),
    /// Numeric literal
    Num(f64),
    /// `f(args)`
    Call(Box<Expr>, Vec<Expr>),
    /// `object:method(args)`
    Method(Box<Expr>, String, Vec<Expr>),
    /// `object[key]`
    Index(Box<Expr>, Box<Expr>),
    /// `{a, b, c}`
    Table(Vec<Expr>),
    /// `{["key"] = value, ...}`
    Record(Vec<(String, Expr)>),
    /// `function (params) ... end`
    Function(Vec<String>, Block),
    /// `left op right`
    Binary(Box<Expr>, &'static str, Box<Expr>),
    /// `#value`
    Len(Box<Expr>),
    /// `not value`
    Not(Box<Expr>),
    /// Rendered neural network module
    Module(Module),
}

/// A Lua statement
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// `local name` or `local name = value`
    Local(String, Option<Expr>),
    /// `target = value`
    Assign(Expr, Expr),
    /// Expression evaluated for its side effects
    Call(Expr),
    Return(Expr),
    /// `if cond then ... else ... end`
    If(Expr, Block, Option<Block>),
    /// `for var=start,end do ... end`
    NumericFor(String, Expr, Expr, Block),
    /// `for k,v in iterator do ... end`
    GenericFor(Vec<String>, Expr, Block),
    /// `function name(params) ... end`
    FunctionDecl(String, Vec<String>, Block),
    /// `-- text`
    Comment(String),
    Blank,
}

/// Sequence of statements
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block(pub Vec<Stmt>);

impl Block {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, stmt: Stmt) {
        self.0.push(stmt);
    }

    pub fn extend(&mut self, other: Block) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Renders the block as top-level source
    pub fn render(&self) -> String {
        self.render_at(0)
    }

    /// Renders every statement at the given depth
    pub fn render_at(&self, depth: usize) -> String {
        let mut out = String::new();
        for stmt in &self.0 {
            stmt.render_into(&mut out, depth);
        }
        out
    }
}

impl From<Vec<Stmt>> for Block {
    fn from(stmts: Vec<Stmt>) -> Self {
        Block(stmts)
    }
}

impl Stmt {
    fn render_into(&self, out: &mut String, depth: usize) {
        let pad = indent(depth);
        match self {
            Stmt::Local(name, None) => {
                let _ = writeln!(out, "{}local {}", pad, name);
            }
            Stmt::Local(name, Some(value)) => {
                let _ = writeln!(out, "{}local {} = {}", pad, name, value.render(depth));
            }
            Stmt::Assign(target, value) => {
                let _ = writeln!(out, "{}{} = {}", pad, target.render(depth), value.render(depth));
            }
            Stmt::Call(expr) => {
                let _ = writeln!(out, "{}{}", pad, expr.render(depth));
            }
            Stmt::Return(expr) => {
                let _ = writeln!(out, "{}return {}", pad, expr.render(depth));
            }
            Stmt::If(condition, then_block, else_block) => {
                let _ = writeln!(out, "{}if {} then", pad, condition.render(depth));
                out.push_str(&then_block.render_at(depth + 1));
                if let Some(else_block) = else_block {
                    let _ = writeln!(out, "{}else", pad);
                    out.push_str(&else_block.render_at(depth + 1));
                }
                let _ = writeln!(out, "{}end", pad);
            }
            Stmt::NumericFor(var, start, end, body) => {
                let _ = writeln!(
                    out,
                    "{}for {}={},{} do",
                    pad,
                    var,
                    start.render(depth),
                    end.render(depth)
                );
                out.push_str(&body.render_at(depth + 1));
                let _ = writeln!(out, "{}end", pad);
            }
            Stmt::GenericFor(vars, iterator, body) => {
                let _ = writeln!(out, "{}for {} in {} do", pad, vars.join(","), iterator.render(depth));
                out.push_str(&body.render_at(depth + 1));
                let _ = writeln!(out, "{}end", pad);
            }
            Stmt::FunctionDecl(name, params, body) => {
                let _ = writeln!(out, "{}function {}({})", pad, name, params.join(", "));
                out.push_str(&body.render_at(depth + 1));
                let _ = writeln!(out, "{}end", pad);
            }
            Stmt::Comment(text) => {
                let _ = writeln!(out, "{}-- {}", pad, text);
            }
            Stmt::Blank => out.push('\n'),
        }
    }
}

impl Expr {
    /// Renders the expression; nested blocks are indented below `depth`
    pub fn render(&self, depth: usize) -> String {
        match self {
            Expr::Raw(text) => text.clone(),
            Expr::Str(text) => quote(text),
            Expr::Num(value) => format_number(*value),
            Expr::Call(callee, args) => format!("{}({})", callee.render(depth), render_list(args, depth)),
            Expr::Method(object, method, args) => {
                format!("{}:{}({})", object.render(depth), method, render_list(args, depth))
            }
            Expr::Index(object, key) => format!("{}[{}]", object.render(depth), key.render(depth)),
            Expr::Table(items) => format!("{{{}}}", render_list(items, depth)),
            Expr::Record(entries) => {
                let body: Vec<String> = entries
                    .iter()
                    .map(|(key, value)| format!("[{}] = {}", quote(key), value.render(depth)))
                    .collect();
                format!("{{{}}}", body.join(", "))
            }
            Expr::Function(params, body) => {
                format!(
                    "function ({})\n{}{}end",
                    params.join(", "),
                    body.render_at(depth + 1),
                    indent(depth)
                )
            }
            Expr::Binary(left, op, right) => {
                format!("{} {} {}", left.render(depth), op, right.render(depth))
            }
            Expr::Len(value) => format!("#{}", value.render(depth)),
            Expr::Not(value) => format!("not {}", value.render(depth)),
            Expr::Module(module) => module.render(depth),
        }
    }
}

fn render_list(items: &[Expr], depth: usize) -> String {
    items.iter().map(|item| item.render(depth)).collect::<Vec<_>>().join(", ")
}

/// Quotes a string literal
pub fn quote(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            _ => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Renders integral values without a fractional part
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

/// Verbatim expression
pub fn raw(text: impl Into<String>) -> Expr {
    Expr::Raw(text.into())
}

/// Numeric literal
pub fn num(value: impl Into<f64>) -> Expr {
    Expr::Num(value.into())
}

/// String literal
pub fn string(text: impl Into<String>) -> Expr {
    Expr::Str(text.into())
}

/// Function call by name
pub fn call(callee: &str, args: Vec<Expr>) -> Expr {
    Expr::Call(Box::new(raw(callee)), args)
}

/// Method call
pub fn method(object: Expr, name: &str, args: Vec<Expr>) -> Expr {
    Expr::Method(Box::new(object), name.to_string(), args)
}

/// Index expression
pub fn index(object: Expr, key: Expr) -> Expr {
    Expr::Index(Box::new(object), Box::new(key))
}

/// Binary operation
pub fn binary(left: Expr, op: &'static str, right: Expr) -> Expr {
    Expr::Binary(Box::new(left), op, Box::new(right))
}

/// Length operator
pub fn len(value: Expr) -> Expr {
    Expr::Len(Box::new(value))
}

/// `local name = function (params) body end`
pub fn local_function(name: &str, params: &[&str], body: Block) -> Stmt {
    Stmt::Local(
        name.to_string(),
        Some(Expr::Function(params.iter().map(|p| p.to_string()).collect(), body)),
    )
}

/// `local name = value`
pub fn local(name: &str, value: Expr) -> Stmt {
    Stmt::Local(name.to_string(), Some(value))
}

/// `table.insert(list, value)`
pub fn table_insert(list: Expr, value: Expr) -> Stmt {
    Stmt::Call(call("table.insert", vec![list, value]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_function_indentation() {
        let inner = Block(vec![Stmt::Return(raw("input"))]);
        let outer = Block(vec![
            local_function("child", &["input"], inner),
            Stmt::Return(call("child", vec![raw("input")])),
        ]);
        let program = Block(vec![local_function("parent", &["input"], outer)]);

        let expected = "\
local parent = function (input)
    local child = function (input)
        return input
    end
    return child(input)
end
";
        assert_eq!(program.render(), expected);
    }

    #[test]
    fn test_control_flow() {
        let body = Block(vec![Stmt::If(
            binary(raw("n"), "<=", index(raw("lengths"), raw("s"))),
            Block(vec![table_insert(raw("out"), raw("n"))]),
            Some(Block(vec![Stmt::Comment("padding".to_string())])),
        )]);
        let program = Block(vec![Stmt::NumericFor("n".to_string(), num(1), len(raw("input")), body)]);

        let expected = "\
for n=1,#input do
    if n <= lengths[s] then
        table.insert(out, n)
    else
        -- padding
    end
end
";
        assert_eq!(program.render(), expected);
    }

    #[test]
    fn test_literals() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(0.25), "0.25");
        assert_eq!(quote("a\"b"), "\"a\\\"b\"");
        let record = Expr::Record(vec![("f".to_string(), num(16))]);
        assert_eq!(record.render(0), "{[\"f\"] = 16}");
    }
}
