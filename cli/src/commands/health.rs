use crate::util::get_json;

pub async fn run(api_url: &str, raw: bool) -> i32 {
    get_json(api_url, "/health", raw).await
}
