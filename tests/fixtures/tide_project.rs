use tide::{Body, Request, Response};

use crate::views::{Goods, GoodsCreateReq, GoodsCreateRes, ListQuery, Page};

mod views;

/// GoodsInfo returns one goods record
/// @summary Goods detail
/// @tags Goods
pub async fn goods_info(req: Request<()>) -> tide::Result {
    let guid = req.param("guid")?;
    let page: Page<Goods> = Page {
        items: Vec::new(),
        total: 0,
    };
    Ok(Response::builder(200).body(Body::from_json(&page)?).build())
}

/// GoodsCreate creates a goods record
/// @summary Create goods
/// @tags Goods
/// @consume application/json
/// @produce application/json
pub async fn goods_create(mut req: Request<()>) -> tide::Result {
    let body: GoodsCreateReq = req.body_json().await?;
    let res = GoodsCreateRes {
        guid: body.name,
        code: crate::views::ErrCode::CodeUnknown,
    };
    Ok(Response::builder(200).body(Body::from_json(&res)?).build())
}

/// GoodsList lists goods with pagination
pub async fn goods_list(req: Request<()>) -> tide::Result {
    let query: ListQuery = req.query()?;
    let page: Page<Goods> = Page {
        items: Vec::new(),
        total: query.page_size as i64,
    };
    Ok(Body::from_json(&page)?.into())
}

fn main() -> tide::Result<()> {
    let mut app = tide::new();
    let mut g = app.at("/api");
    let mut v2 = g.at("/v2");
    v2.at("/goods/:guid").get(goods_info);
    g.at("/goods").post(goods_create);
    g.at("/goods").get(goods_list);
    Ok(())
}
