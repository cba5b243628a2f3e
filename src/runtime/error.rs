use thiserror::Error;

pub type RuntimeResult<T> = Result<T, RuntimeError>;

#[derive(Clone, Debug, Error)]
pub enum RuntimeError {
    #[error("Undefined variable '{name}'.")]
    UndefinedVariable { name: String },
    #[error("Undefined property '{name}'.")]
    UndefinedProperty { name: String },
    #[error("Undefined type '{name}'.")]
    UndefinedType { name: String },
    #[error("Method '{name}' not defined for type '{type_name}'.")]
    UndefinedMethod { name: String, type_name: String },
    #[error("Cannot assign to immutable variable '{name}'.")]
    ImmutableBinding { name: String },
    #[error("Type mismatch for '{name}'. Expected {expected} but got {actual}.")]
    TypeMismatch {
        name: String,
        expected: String,
        actual: String,
    },
    #[error("{message}")]
    OperandType { message: String },
    #[error("Expected {expected} arguments but got {received}.")]
    FieldArity { expected: usize, received: usize },
    #[error("Lambda expects {expected} args.")]
    LambdaArity { expected: usize },
    #[error("Method {name} expects {expected} args.")]
    MethodArity { name: String, expected: usize },
    #[error("Can only call functions, methods, or lambdas.")]
    NotCallable,
    #[error("Property '{name}' is not a function.")]
    PropertyNotCallable { name: String },
    #[error("Only instances have properties.")]
    NotAnInstance,
    #[error("Can only dereference a pointer.")]
    NotAPointer,
    #[error("Can only assign to a dereferenced pointer.")]
    PointerAssignTarget,
    #[error("Division by zero.")]
    DivisionByZero,
    #[error("Index out of bounds: {index}")]
    IndexOutOfBounds { index: i32 },
    #[error("Segmentation Fault: accessing deleted or invalid memory at {address}")]
    SegmentationFault { address: String },
    #[error("Ref count underflow for {address}")]
    RefCountUnderflow { address: String },
    #[error("Could not import module '{path}': {reason}")]
    ImportFailed { path: String, reason: String },
    #[error("{message}")]
    Native { message: String },
}
