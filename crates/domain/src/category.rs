use serde::Serialize;

use crate::errors::{DomainError, Violations};
use crate::value_objects::{is_http_url, CategoryId, Timestamp};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub slug: String,
    pub code: Option<String>,
    pub parent_id: Option<CategoryId>,
    pub image_url: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    #[serde(skip_serializing)]
    pub destroyed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryDraft {
    pub name: String,
    pub code: Option<String>,
    pub parent_id: Option<CategoryId>,
    pub image_url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryPatch {
    pub name: Option<String>,
    pub code: Option<String>,
    pub parent_id: Option<CategoryId>,
    pub image_url: Option<String>,
}

/// 由名称生成 slug：转小写，非字母数字的连续字符折叠为单个 `-`。
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.chars().flat_map(char::to_lowercase) {
        if c.is_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else {
            pending_dash = true;
        }
    }
    slug
}

fn normalize_code(code: Option<String>) -> Option<String> {
    code.map(|c| c.trim().to_owned()).filter(|c| !c.is_empty())
}

fn check_fields(
    violations: &mut Violations,
    name: Option<&str>,
    code: Option<&str>,
    image_url: Option<&str>,
) {
    if let Some(name) = name {
        let len = name.trim().chars().count();
        violations.check((3..=50).contains(&len), "name", "must be 3-50 characters");
    }
    if let Some(code) = code {
        violations.check(code.chars().count() <= 256, "code", "must be at most 256 characters");
    }
    if let Some(url) = image_url {
        violations.check(is_http_url(url), "imageUrl", "must be an http(s) url");
    }
}

impl Category {
    pub fn create(id: CategoryId, draft: CategoryDraft, now: Timestamp) -> Result<Self, DomainError> {
        let code = normalize_code(draft.code);
        let mut violations = Violations::new();
        check_fields(
            &mut violations,
            Some(&draft.name),
            code.as_deref(),
            draft.image_url.as_deref(),
        );
        violations.check(
            draft.parent_id != Some(id),
            "parentId",
            "a category cannot be its own parent",
        );
        violations.into_result()?;

        let name = draft.name.trim().to_owned();
        Ok(Self {
            id,
            slug: slugify(&name),
            name,
            code,
            parent_id: draft.parent_id,
            image_url: draft.image_url,
            created_at: now,
            updated_at: now,
            destroyed: false,
        })
    }

    /// 应用修改。父级环检测需要遍历存储，由调用方完成。
    pub fn apply(&mut self, patch: CategoryPatch, now: Timestamp) -> Result<(), DomainError> {
        let code = normalize_code(patch.code);
        let mut violations = Violations::new();
        check_fields(
            &mut violations,
            patch.name.as_deref(),
            code.as_deref(),
            patch.image_url.as_deref(),
        );
        if patch.parent_id == Some(self.id) {
            return Err(DomainError::CategoryCycle);
        }
        violations.into_result()?;

        if let Some(name) = patch.name {
            self.name = name.trim().to_owned();
            self.slug = slugify(&self.name);
        }
        if code.is_some() {
            self.code = code;
        }
        if let Some(parent_id) = patch.parent_id {
            self.parent_id = Some(parent_id);
        }
        if let Some(image_url) = patch.image_url {
            self.image_url = Some(image_url);
        }
        self.updated_at = now;
        Ok(())
    }
}
