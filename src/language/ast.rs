use crate::language::span::Span;

#[derive(Clone, Debug)]
pub enum Stmt {
    Let(LetStmt),
    Type(TypeDecl),
    Impl(ImplBlock),
    Function(FunctionDecl),
    Return(ReturnStmt),
    If(IfStmt),
    While(WhileStmt),
    Block(Vec<Stmt>),
    Print(PrintStmt),
    Delete(DeleteStmt),
    Import(ImportStmt),
    Expression(ExprStmt),
}

#[derive(Clone, Debug)]
pub struct LetStmt {
    pub name: String,
    pub initializer: Expr,
    pub mutable: bool,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct TypeDecl {
    pub name: String,
    pub kind: TypeKind,
    pub fields: Vec<String>,
    pub span: Span,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TypeKind {
    Struct,
    Class,
}

#[derive(Clone, Debug)]
pub struct ImplBlock {
    pub type_name: String,
    pub methods: Vec<FunctionDecl>,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct FunctionDecl {
    pub name: String,
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct ReturnStmt {
    pub value: Option<Expr>,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct IfStmt {
    pub condition: Expr,
    pub then_branch: Box<Stmt>,
    pub else_branch: Option<Box<Stmt>>,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct WhileStmt {
    pub condition: Expr,
    pub body: Box<Stmt>,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct PrintStmt {
    pub expr: Expr,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct DeleteStmt {
    pub name: String,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct ImportStmt {
    pub path: String,
    pub alias: String,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct ExprStmt {
    pub expr: Expr,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub enum Expr {
    Literal(Literal),
    Variable(Identifier),
    Assign {
        name: Identifier,
        value: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
        span: Span,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
        span: Span,
    },
    Grouping(Box<Expr>),
    Get {
        object: Box<Expr>,
        name: Identifier,
    },
    Set {
        object: Box<Expr>,
        name: Identifier,
        value: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        span: Span,
    },
    New {
        type_name: Identifier,
        args: Vec<Expr>,
        span: Span,
    },
    This(Span),
    ListLit {
        elements: Vec<Expr>,
        span: Span,
    },
    Lambda(LambdaExpr),
    AddressOf(Identifier),
    Dereference {
        expr: Box<Expr>,
        span: Span,
    },
    PointerSet {
        pointer: Box<Expr>,
        value: Box<Expr>,
        span: Span,
    },
    Atom {
        name: String,
        span: Span,
    },
    Tuple {
        elements: Vec<Expr>,
        span: Span,
    },
    MapLit {
        keys: Vec<Expr>,
        values: Vec<Expr>,
        span: Span,
    },
}

#[derive(Clone, Debug)]
pub struct Identifier {
    pub name: String,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub enum Literal {
    Int(i32, Span),
    Str(String, Span),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    NotEq,
    Less,
    LessEq,
    Greater,
    GreaterEq,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Less => "<",
            BinaryOp::LessEq => "<=",
            BinaryOp::Greater => ">",
            BinaryOp::GreaterEq => ">=",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Clone, Debug)]
pub struct LambdaExpr {
    pub captures: Vec<Capture>,
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
    pub span: Span,
}

/// A lambda capture: `x` copies the current value into the closure
/// scope, `*x` captures a pointer aliasing the original binding.
#[derive(Clone, Debug)]
pub enum Capture {
    ByValue(Identifier),
    ByAddress(Identifier),
}
