use salvo::prelude::*;

pub mod e {
    /// Wraps a payload into the standard response envelope.
    pub fn success<T>(data: T) -> T {
        data
    }
}

#[derive(serde::Deserialize)]
pub struct GoodsInfoParams {
    /// Goods Guid
    #[serde(rename = "guid")]
    pub goods_guid: i64,
}

#[derive(serde::Serialize)]
pub struct GoodsInfoRes {
    pub guid: String,
    pub name: String,
}

/// GoodsInfo returns the goods detail
/// @summary Goods detail
pub async fn goods_info(req: &mut salvo::Request, res: &mut salvo::Response) {
    let params = req.parse_params::<GoodsInfoParams>().await;
    let body = GoodsInfoRes {
        guid: String::new(),
        name: String::new(),
    };
    res.render(Json(e::success(body)));
}

/// GoodsDown takes a goods record offline
pub async fn goods_down(req: &mut salvo::Request, res: &mut salvo::Response) {
    let operator = req.form::<String>("operatorUid").await;
    let range = req.form::<Vec<String>>("dateRange").await;
    let fallback = req
        .form::<String>("defaultPostForm")
        .await
        .unwrap_or("yyyy".to_string());
    res.status_code(StatusCode::OK);
}

pub fn routes() -> Router {
    Router::with_path("api").push(
        Router::with_path("v2")
            .push(Router::with_path("goods/<guid>").get(goods_info))
            .push(Router::with_path("goods/down").post(goods_down)),
    )
}

#[tokio::main]
async fn main() {
    let router = routes();
    let acceptor = TcpListener::new("127.0.0.1:5800").bind().await;
    Server::new(acceptor).serve(Service::new(router)).await;
}
