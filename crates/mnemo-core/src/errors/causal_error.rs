/// Errors raised by causal-edge validation and traversal.
#[derive(Debug, thiserror::Error)]
pub enum CausalError {
    #[error("edge endpoints must differ: {id}")]
    SelfLoop { id: String },

    #[error("unknown causal relation: {value}")]
    UnknownRelation { value: String },

    #[error("edge strength {value} is not a finite number in [0, 1]")]
    StrengthOutOfRange { value: f64 },

    #[error("causal edge not found: {id}")]
    EdgeNotFound { id: i64 },
}
