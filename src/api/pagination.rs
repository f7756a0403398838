use serde::Deserialize;

use crate::config;

/// `?limit=&offset=` as sent by clients
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Clamped window ready to bind into LIMIT/OFFSET
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: i64,
    pub offset: i64,
}

impl PageQuery {
    pub fn page(&self) -> Page {
        let api = &config::config().api;
        self.clamp(api.default_page_size, api.max_page_size)
    }

    fn clamp(&self, default_size: i64, max_size: i64) -> Page {
        Page {
            limit: self.limit.unwrap_or(default_size).clamp(1, max_size.max(1)),
            offset: self.offset.unwrap_or(0).max(0),
        }
    }
}
