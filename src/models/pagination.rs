use serde::{Deserialize, Serialize};

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_LIMIT: u32 = 10;
pub const MAX_LIMIT: u32 = 100;

/// Page/limit query parameters. Missing or zero values fall back to the
/// defaults; `limit` is capped at [`MAX_LIMIT`].
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageRequest {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl PageRequest {
    pub fn new(page: u32, limit: u32) -> Self {
        Self {
            page: Some(page),
            limit: Some(limit),
        }
    }

    pub fn page(&self) -> u32 {
        self.page.filter(|p| *p > 0).unwrap_or(DEFAULT_PAGE)
    }

    pub fn limit(&self) -> u32 {
        self.limit
            .filter(|l| *l > 0)
            .unwrap_or(DEFAULT_LIMIT)
            .min(MAX_LIMIT)
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page() - 1) * u64::from(self.limit())
    }
}

#[derive(Debug, Serialize)]
pub struct Page {
    pub total: u64,
    pub page: u32,
    pub pages: u64,
}

impl Page {
    pub fn new(request: &PageRequest, total: u64) -> Self {
        let limit = u64::from(request.limit());
        Self {
            total,
            page: request.page(),
            pages: total.div_ceil(limit),
        }
    }
}
