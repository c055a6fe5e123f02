use serde::{Deserialize, Serialize};

/// A sellable item
#[derive(Debug, Serialize, Deserialize)]
pub struct Goods {
    pub guid: String,
    pub name: String,
    #[serde(rename = "goodsPrice")]
    pub price: f64,
}

#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
}

#[derive(Debug, Deserialize)]
pub struct GoodsCreateReq {
    pub name: String,
    pub price: f64,
    pub comment: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GoodsCreateRes {
    pub guid: String,
    pub code: ErrCode,
}

/// Business error code
#[derive(Debug, Serialize)]
pub enum ErrCode {
    CodeNotFound = 10000,
    CodeCancled,
    CodeUnknown,
    CodeInvalidArgument,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(rename = "pageSize")]
    pub page_size: i32,
    pub keyword: Option<String>,
}
