use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema, Clone)]
pub struct Meta {
    pub page: Option<i64>,
    pub per_page: Option<i64>,
    pub total: Option<i64>,
}

impl Meta {
    pub fn new(page: i64, per_page: i64, total: i64) -> Self {
        Self {
            page: Some(page),
            per_page: Some(per_page),
            total: Some(total),
        }
    }

    pub fn empty() -> Self {
        Self {
            page: None,
            per_page: None,
            total: None,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub message: String,
    pub data: Option<T>,
    pub meta: Option<Meta>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(message: impl Into<String>, data: T, meta: Option<Meta>) -> Self {
        Self {
            message: message.into(),
            data: Some(data),
            meta,
        }
    }
}

/// One page of a listing plus the numbers needed to build its `Meta`.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
}

impl<T> Page<T> {
    pub fn meta(&self) -> Meta {
        Meta::new(self.page, self.per_page, self.total)
    }

    pub fn has_next(&self) -> bool {
        self.page.saturating_mul(self.per_page) < self.total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn has_next_uses_total() {
        let page = Page {
            items: vec![1, 2],
            page: 1,
            per_page: 2,
            total: 3,
        };
        assert!(page.has_next());
        let last = Page {
            items: vec![3],
            page: 2,
            per_page: 2,
            total: 3,
        };
        assert!(!last.has_next());
        assert_eq!(last.meta().total, Some(3));

        let far = Page::<i32> {
            items: vec![],
            page: i64::MAX,
            per_page: 100,
            total: 3,
        };
        assert!(!far.has_next());
    }
}
