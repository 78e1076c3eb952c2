use serde::{Deserialize, Serialize};

pub const DEFAULT_LIMIT: i64 = 20;
pub const MAX_LIMIT: i64 = 100;

/// `?page=&limit=` as sent by the client. Out-of-range values are clamped.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PageParams {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    DEFAULT_LIMIT
}

impl Default for PageParams {
    fn default() -> Self {
        Self {
            page: default_page(),
            limit: default_limit(),
        }
    }
}

impl PageParams {
    pub fn page(&self) -> i64 {
        self.page.max(1)
    }

    pub fn limit(&self) -> i64 {
        self.limit.clamp(1, MAX_LIMIT)
    }

    pub fn offset(&self) -> i64 {
        (self.page() - 1).saturating_mul(self.limit())
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub limit: i64,
    pub total: i64,
    pub total_pages: i64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, params: PageParams, total: i64) -> Self {
        let limit = params.limit();
        let total = total.max(0);
        Self {
            items,
            page: params.page(),
            limit,
            total,
            total_pages: (total + limit - 1) / limit,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_page_of_45_rows() {
        let p = PageParams { page: 2, limit: 20 };
        assert_eq!(p.offset(), 20);
        let page = Page::new(vec![(); 20], p, 45);
        assert_eq!(page.items.len(), 20);
        assert_eq!(page.total_pages, 3);
    }

    #[test]
    fn clamps_bad_input() {
        let p = PageParams { page: 0, limit: 1000 };
        assert_eq!(p.page(), 1);
        assert_eq!(p.limit(), MAX_LIMIT);
        assert_eq!(p.offset(), 0);

        let p = PageParams { page: -3, limit: 0 };
        assert_eq!(p.limit(), 1);
        assert_eq!(p.offset(), 0);
    }

    #[test]
    fn empty_listing_has_zero_pages() {
        let page: Page<()> = Page::new(Vec::new(), PageParams::default(), 0);
        assert_eq!(page.total_pages, 0);
        assert_eq!(page.page, 1);
    }

    #[test]
    fn serializes_total_pages_camel_case() {
        let page = Page::new(vec![1, 2], PageParams::default(), 2);
        let json = serde_json::to_value(&page).unwrap();
        assert_eq!(json["totalPages"], 1);
        assert_eq!(json["items"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn missing_query_fields_use_defaults() {
        let p: PageParams = serde_json::from_str("{}").unwrap();
        assert_eq!((p.page(), p.limit()), (1, DEFAULT_LIMIT));
    }
}
