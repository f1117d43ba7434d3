//! 领域模型错误定义
//!
//! 定义了系统中所有可能的领域错误与仓储错误，提供清晰的错误上下文。

use serde::Serialize;
use thiserror::Error;

/// 单个字段的校验失败信息。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// 收集一次写入前校验中的全部字段错误。
#[derive(Debug, Default)]
pub struct Violations(Vec<FieldViolation>);

impl Violations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.push(FieldViolation::new(field, message));
    }

    /// 条件不成立时记录错误。
    pub fn check(&mut self, ok: bool, field: &str, message: &str) {
        if !ok {
            self.push(field, message);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_result(self) -> Result<(), DomainError> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(DomainError::Validation { violations: self.0 })
        }
    }
}

/// 领域模型错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    /// 字段校验失败，携带全部违规字段
    #[error("验证失败: {}", summarize(.violations))]
    Validation { violations: Vec<FieldViolation> },

    /// 标识符格式错误（必须是 24 位十六进制）
    #[error("无效的标识符 {field}: {value}")]
    InvalidIdentifier { field: String, value: String },

    /// 资源不存在或已被软删除
    #[error("资源不存在: {resource} {id}")]
    NotFound { resource: &'static str, id: String },

    /// 已认证但无权执行该操作
    #[error("权限不足: {action}")]
    Forbidden { action: String },

    /// 唯一字段冲突
    #[error("资源已存在: {resource} {field}={value}")]
    Conflict {
        resource: &'static str,
        field: &'static str,
        value: String,
    },

    /// 分类父级引用形成环
    #[error("分类父级引用形成环")]
    CategoryCycle,
}

fn summarize(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(|v| format!("{}: {}", v.field, v.message))
        .collect::<Vec<_>>()
        .join("; ")
}

impl DomainError {
    /// 创建单字段验证错误
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            violations: vec![FieldViolation::new(field, message)],
        }
    }

    pub fn invalid_identifier(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidIdentifier {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn not_found(resource: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    pub fn forbidden(action: impl Into<String>) -> Self {
        Self::Forbidden {
            action: action.into(),
        }
    }

    pub fn conflict(resource: &'static str, field: &'static str, value: impl Into<String>) -> Self {
        Self::Conflict {
            resource,
            field,
            value: value.into(),
        }
    }
}

/// 领域模型结果类型
pub type DomainResult<T> = Result<T, DomainError>;

/// 仓储层错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RepositoryError {
    #[error("record not found")]
    NotFound,
    #[error("unique constraint violated: {constraint}")]
    Conflict { constraint: String },
    #[error("storage error: {message}")]
    Storage { message: String },
}

impl RepositoryError {
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn conflict(constraint: impl Into<String>) -> Self {
        Self::Conflict {
            constraint: constraint.into(),
        }
    }
}
