//! Parse Server REST client
//!
//! Maps the `ImageList` and `ImageItem` classes onto typed records. Parse
//! objects travel as loosely typed JSON; everything backend-shaped stays in
//! this file.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tokio::sync::OnceCell;

use super::repository::ObjectStore;
use super::types::{
    validate_columns, ImageItem, ImageItemUpdate, ImageList, ImageListUpdate, NewImageItem,
    NewImageList, Page, StoreError, StoredFile,
};
use crate::config::StoreConfig;

const IMAGE_LIST_CLASS: &str = "ImageList";
const IMAGE_ITEM_CLASS: &str = "ImageItem";
const USER_CLASS: &str = "_User";

/// Parse error code for a missing object
const OBJECT_NOT_FOUND: i64 = 101;

/// Rows per item query; Parse caps an unpaginated query at 100
const ITEM_PAGE_SIZE: u32 = 1000;

// ============================================================================
// Wire types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParseImageList {
    object_id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    columns: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParseImageItem {
    object_id: String,
    #[serde(default)]
    file_name: Option<String>,
    #[serde(default)]
    file: Option<ParseFile>,
    #[serde(default)]
    order: Option<u32>,
    #[serde(default)]
    image_list: Option<ParsePointer>,
    #[serde(default)]
    ocr_text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ParseFile {
    name: String,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParsePointer {
    object_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedResponse {
    object_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CurrentUser {
    object_id: String,
}

#[derive(Debug, Deserialize)]
struct QueryResponse<T> {
    results: Vec<T>,
    #[serde(default)]
    count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct FileResponse {
    name: String,
    url: String,
}

#[derive(Debug, Deserialize)]
struct ParseErrorBody {
    #[serde(default)]
    code: Option<i64>,
    #[serde(default)]
    error: Option<String>,
}

impl From<ParseImageList> for ImageList {
    fn from(raw: ParseImageList) -> Self {
        ImageList {
            id: raw.object_id,
            name: raw.name.unwrap_or_default(),
            columns: raw.columns.unwrap_or(1).max(1),
        }
    }
}

impl ParseImageItem {
    fn into_item(self, fallback_list_id: Option<&str>) -> ImageItem {
        let file = self.file.map(|f| StoredFile {
            name: f.name,
            url: f.url,
        });

        ImageItem {
            id: self.object_id,
            file_name: self.file_name.unwrap_or_default(),
            file_url: file.as_ref().and_then(|f| f.url.clone()),
            file,
            order: self.order.unwrap_or_default(),
            image_list_id: self
                .image_list
                .map(|p| p.object_id)
                .or_else(|| fallback_list_id.map(str::to_string))
                .unwrap_or_default(),
            ocr_text: self.ocr_text.filter(|t| !t.is_empty()),
        }
    }
}

fn pointer(class_name: &str, object_id: &str) -> Value {
    json!({ "__type": "Pointer", "className": class_name, "objectId": object_id })
}

fn file_value(file: &StoredFile) -> Value {
    json!({ "__type": "File", "name": file.name, "url": file.url })
}

// ============================================================================
// Client
// ============================================================================

/// Object store backed by a Parse Server REST endpoint
#[derive(Clone)]
pub struct ParseClient {
    http: reqwest::Client,
    server_url: String,
    app_id: String,
    rest_api_key: Option<String>,
    master_key: Option<String>,
    session_token: Option<String>,
    /// Session user, configured or looked up from the token on first use
    owner: Arc<OnceCell<Option<String>>>,
}

impl ParseClient {
    /// Create a client from configuration
    pub fn new(config: &StoreConfig) -> Result<Self, StoreError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| StoreError::Remote(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            server_url: config.server_url.trim_end_matches('/').to_string(),
            app_id: config.app_id.clone(),
            rest_api_key: config.rest_api_key.clone(),
            master_key: config.master_key.clone(),
            session_token: config.session_token.clone(),
            owner: Arc::new(OnceCell::new_with(config.user_id.clone().map(Some))),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut request = self
            .http
            .request(method, format!("{}{}", self.server_url, path))
            .header("X-Parse-Application-Id", &self.app_id);

        if let Some(key) = &self.rest_api_key {
            request = request.header("X-Parse-REST-API-Key", key);
        }
        if let Some(token) = &self.session_token {
            request = request.header("X-Parse-Session-Token", token);
        }
        request
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder, what: &str) -> Result<T, StoreError> {
        let response = request
            .send()
            .await
            .map_err(|e| StoreError::Remote(format!("{}: {}", what, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::classify_error(status, &body, what));
        }

        response
            .json()
            .await
            .map_err(|e| StoreError::Remote(format!("{}: invalid response: {}", what, e)))
    }

    fn classify_error(status: StatusCode, body: &str, what: &str) -> StoreError {
        let parsed: Option<ParseErrorBody> = serde_json::from_str(body).ok();
        let code = parsed.as_ref().and_then(|b| b.code);
        let message = parsed
            .and_then(|b| b.error)
            .unwrap_or_else(|| body.to_string());

        if status == StatusCode::NOT_FOUND || code == Some(OBJECT_NOT_FOUND) {
            StoreError::NotFound(format!("{}: {}", what, message))
        } else {
            StoreError::Remote(format!("{} ({}): {}", what, status, message))
        }
    }

    /// The session user's object id, `None` without a session
    async fn owner(&self) -> Result<Option<&str>, StoreError> {
        let owner = self
            .owner
            .get_or_try_init(|| async {
                if self.session_token.is_none() {
                    return Ok(None);
                }
                let me: CurrentUser = self
                    .send(self.request(Method::GET, "/users/me"), "resolve session user")
                    .await?;
                tracing::debug!(user_id = %me.object_id, "Resolved session user");
                Ok::<_, StoreError>(Some(me.object_id))
            })
            .await?;
        Ok(owner.as_deref())
    }

    /// Owner pointer and ACL for new records when a user session is configured
    async fn apply_ownership(&self, fields: &mut Map<String, Value>) -> Result<(), StoreError> {
        if let Some(user_id) = self.owner().await? {
            let mut acl = Map::new();
            acl.insert(user_id.to_string(), json!({ "read": true, "write": true }));

            fields.insert("owner".to_string(), pointer(USER_CLASS, user_id));
            fields.insert("ACL".to_string(), Value::Object(acl));
        }
        Ok(())
    }

    /// Restrict a query to the session user's records
    async fn scoped(&self, mut filter: Map<String, Value>) -> Result<Value, StoreError> {
        if let Some(user_id) = self.owner().await? {
            filter.insert("owner".to_string(), pointer(USER_CLASS, user_id));
        }
        Ok(Value::Object(filter))
    }

    async fn upload_file(&self, file_name: &str, base64_data: &str) -> Result<StoredFile, StoreError> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(base64_data)
            .map_err(|e| StoreError::InvalidInput(format!("Invalid base64 data: {}", e)))?;

        let content_type = mime_guess::from_path(file_name).first_or(mime_guess::mime::IMAGE_JPEG);
        let request = self
            .request(Method::POST, &format!("/files/{}", urlencoding::encode(file_name)))
            .header(reqwest::header::CONTENT_TYPE, content_type.essence_str())
            .body(bytes);

        let saved: FileResponse = self.send(request, "upload file").await?;
        tracing::debug!(file = %saved.name, "Stored file");

        Ok(StoredFile {
            name: saved.name,
            url: Some(saved.url),
        })
    }

    async fn query_items(&self, filter: &Value, skip: usize, limit: u32) -> Result<Vec<ImageItem>, StoreError> {
        let request = self
            .request(Method::GET, &format!("/classes/{}", IMAGE_ITEM_CLASS))
            .query(&[
                ("where", filter.to_string()),
                ("order", "order".to_string()),
                ("skip", skip.to_string()),
                ("limit", limit.to_string()),
            ]);

        let response: QueryResponse<ParseImageItem> = self.send(request, "query image items").await?;
        Ok(response
            .results
            .into_iter()
            .map(|raw| raw.into_item(None))
            .collect())
    }

    async fn put_fields(&self, class_name: &str, id: &str, fields: Value, what: &str) -> Result<(), StoreError> {
        let request = self
            .request(Method::PUT, &format!("/classes/{}/{}", class_name, id))
            .json(&fields);
        let _: Value = self.send(request, what).await?;
        Ok(())
    }

    async fn delete_object(&self, class_name: &str, id: &str, what: &str) -> Result<(), StoreError> {
        let request = self.request(Method::DELETE, &format!("/classes/{}/{}", class_name, id));
        let _: Value = self.send(request, what).await?;
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for ParseClient {
    async fn list_image_lists(&self, page: u32, page_size: u32) -> Result<Page<ImageList>, StoreError> {
        let page_size = page_size.max(1);
        let skip = page.saturating_sub(1) * page_size;

        let request = self
            .request(Method::GET, &format!("/classes/{}", IMAGE_LIST_CLASS))
            .query(&[
                ("where", self.scoped(Map::new()).await?.to_string()),
                ("order", "-createdAt".to_string()),
                ("skip", skip.to_string()),
                ("limit", page_size.to_string()),
                ("count", "1".to_string()),
            ]);

        let response: QueryResponse<ParseImageList> = self.send(request, "list image lists").await?;
        let items: Vec<ImageList> = response.results.into_iter().map(ImageList::from).collect();
        Ok(Page {
            total: response.count.unwrap_or(items.len() as u64),
            items,
        })
    }

    async fn get_image_list(&self, id: &str) -> Result<ImageList, StoreError> {
        let request = self.request(Method::GET, &format!("/classes/{}/{}", IMAGE_LIST_CLASS, id));
        let raw: ParseImageList = self.send(request, &format!("get image list {}", id)).await?;
        Ok(raw.into())
    }

    async fn create_image_list(&self, list: NewImageList) -> Result<ImageList, StoreError> {
        validate_columns(list.columns)?;

        let mut fields = Map::new();
        fields.insert("name".to_string(), json!(list.name));
        fields.insert("columns".to_string(), json!(list.columns));
        self.apply_ownership(&mut fields).await?;

        let request = self
            .request(Method::POST, &format!("/classes/{}", IMAGE_LIST_CLASS))
            .json(&fields);
        let created: CreatedResponse = self.send(request, "create image list").await?;

        tracing::info!(list_id = %created.object_id, name = %list.name, "Created image list");
        Ok(ImageList {
            id: created.object_id,
            name: list.name,
            columns: list.columns,
        })
    }

    async fn update_image_list(&self, id: &str, update: ImageListUpdate) -> Result<ImageList, StoreError> {
        let mut fields = Map::new();
        if let Some(name) = update.name {
            fields.insert("name".to_string(), json!(name));
        }
        if let Some(columns) = update.columns {
            validate_columns(columns)?;
            fields.insert("columns".to_string(), json!(columns));
        }

        if !fields.is_empty() {
            self.put_fields(IMAGE_LIST_CLASS, id, Value::Object(fields), "update image list")
                .await?;
        }
        self.get_image_list(id).await
    }

    async fn delete_image_list_record(&self, id: &str) -> Result<(), StoreError> {
        self.delete_object(IMAGE_LIST_CLASS, id, "delete image list").await
    }

    async fn list_image_items(&self, image_list_id: &str) -> Result<Vec<ImageItem>, StoreError> {
        let mut filter = Map::new();
        filter.insert("imageList".to_string(), pointer(IMAGE_LIST_CLASS, image_list_id));
        let filter = self.scoped(filter).await?;

        let mut items = Vec::new();
        loop {
            let page = self.query_items(&filter, items.len(), ITEM_PAGE_SIZE).await?;
            let last = page.len() < ITEM_PAGE_SIZE as usize;
            items.extend(page);
            if last {
                return Ok(items);
            }
        }
    }

    async fn find_image_item_by_order(
        &self,
        image_list_id: &str,
        order: u32,
    ) -> Result<Option<ImageItem>, StoreError> {
        let mut filter = Map::new();
        filter.insert("imageList".to_string(), pointer(IMAGE_LIST_CLASS, image_list_id));
        filter.insert("order".to_string(), json!(order));
        let filter = self.scoped(filter).await?;
        Ok(self.query_items(&filter, 0, 1).await?.into_iter().next())
    }

    async fn get_image_item(&self, id: &str) -> Result<ImageItem, StoreError> {
        let request = self.request(Method::GET, &format!("/classes/{}/{}", IMAGE_ITEM_CLASS, id));
        let raw: ParseImageItem = self.send(request, &format!("get image item {}", id)).await?;
        Ok(raw.into_item(None))
    }

    async fn create_image_item(&self, item: NewImageItem) -> Result<ImageItem, StoreError> {
        let file = self.upload_file(&item.file_name, &item.base64_data).await?;

        let mut fields = Map::new();
        fields.insert("fileName".to_string(), json!(item.file_name));
        fields.insert("file".to_string(), file_value(&file));
        fields.insert("order".to_string(), json!(item.order));
        fields.insert("imageList".to_string(), pointer(IMAGE_LIST_CLASS, &item.image_list_id));
        self.apply_ownership(&mut fields).await?;

        let request = self
            .request(Method::POST, &format!("/classes/{}", IMAGE_ITEM_CLASS))
            .json(&fields);
        let created: CreatedResponse = self.send(request, "create image item").await?;

        tracing::info!(
            item_id = %created.object_id,
            list_id = %item.image_list_id,
            order = item.order,
            "Created image item"
        );

        Ok(ImageItem {
            id: created.object_id,
            file_name: item.file_name,
            file_url: file.url.clone(),
            file: Some(file),
            order: item.order,
            image_list_id: item.image_list_id,
            ocr_text: None,
        })
    }

    async fn update_image_item(&self, id: &str, update: ImageItemUpdate) -> Result<ImageItem, StoreError> {
        let current = self.get_image_item(id).await?;

        let mut fields = Map::new();
        if let Some(file_name) = &update.file_name {
            fields.insert("fileName".to_string(), json!(file_name));
        }
        if let Some(data) = &update.base64_data {
            let name = update.file_name.as_deref().unwrap_or(&current.file_name);
            let file = self.upload_file(name, data).await?;
            fields.insert("file".to_string(), file_value(&file));
        }

        if !fields.is_empty() {
            self.put_fields(IMAGE_ITEM_CLASS, id, Value::Object(fields), "update image item")
                .await?;
        }
        self.get_image_item(id).await
    }

    async fn update_image_item_ocr_text(&self, id: &str, text: &str) -> Result<ImageItem, StoreError> {
        self.put_fields(IMAGE_ITEM_CLASS, id, json!({ "ocrText": text }), "update OCR text")
            .await?;
        self.get_image_item(id).await
    }

    async fn delete_image_item(&self, id: &str) -> Result<(), StoreError> {
        self.delete_object(IMAGE_ITEM_CLASS, id, "delete image item").await
    }

    async fn delete_stored_file(&self, file: &StoredFile) -> Result<(), StoreError> {
        let master_key = self.master_key.as_ref().ok_or_else(|| {
            StoreError::Remote(format!("Deleting file {} requires the master key", file.name))
        })?;

        let request = self
            .request(Method::DELETE, &format!("/files/{}", urlencoding::encode(&file.name)))
            .header("X-Parse-Master-Key", master_key);

        let response = request
            .send()
            .await
            .map_err(|e| StoreError::Remote(format!("delete file: {}", e)))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Self::classify_error(status, &body, "delete file"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    use axum::extract::{Path, Query, State};
    use axum::http::{HeaderMap, StatusCode as AxumStatus};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorded {
        created: Vec<Value>,
        queries: Vec<HashMap<String, String>>,
        app_ids: Vec<String>,
        user_lookups: usize,
    }

    type Shared = Arc<Mutex<Recorded>>;

    async fn upload_file(Path(name): Path<String>) -> (AxumStatus, Json<Value>) {
        (
            AxumStatus::CREATED,
            Json(json!({ "name": format!("tfss-{}", name), "url": format!("http://files/{}", name) })),
        )
    }

    async fn create_item(
        State(shared): State<Shared>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> (AxumStatus, Json<Value>) {
        let mut recorded = shared.lock();
        if let Some(app_id) = headers.get("X-Parse-Application-Id") {
            recorded.app_ids.push(app_id.to_str().unwrap_or_default().to_string());
        }
        recorded.created.push(body);
        (AxumStatus::CREATED, Json(json!({ "objectId": "item1", "createdAt": "2024-01-01T00:00:00.000Z" })))
    }

    async fn query_items(
        State(shared): State<Shared>,
        Query(params): Query<HashMap<String, String>>,
    ) -> Json<Value> {
        shared.lock().queries.push(params);
        Json(json!({
            "results": [
                {
                    "objectId": "b",
                    "fileName": "b.jpg",
                    "file": { "__type": "File", "name": "tfss-b.jpg", "url": "http://files/b.jpg" },
                    "order": 4,
                    "imageList": { "__type": "Pointer", "className": "ImageList", "objectId": "list1" },
                    "ocrText": ""
                }
            ]
        }))
    }

    async fn current_user(State(shared): State<Shared>, headers: HeaderMap) -> (AxumStatus, Json<Value>) {
        shared.lock().user_lookups += 1;
        match headers.get("X-Parse-Session-Token").and_then(|t| t.to_str().ok()) {
            Some("r:valid") => (AxumStatus::OK, Json(json!({ "objectId": "user9", "username": "sam" }))),
            _ => (AxumStatus::BAD_REQUEST, Json(json!({ "code": 209, "error": "Invalid session token" }))),
        }
    }

    /// Serves `total` items, honoring `skip` and `limit`
    async fn paged_items(
        State((shared, total)): State<(Shared, u32)>,
        Query(params): Query<HashMap<String, String>>,
    ) -> Json<Value> {
        let skip: u32 = params.get("skip").and_then(|v| v.parse().ok()).unwrap_or(0);
        let limit: u32 = params.get("limit").and_then(|v| v.parse().ok()).unwrap_or(100);
        shared.lock().queries.push(params);

        let results: Vec<Value> = (skip..total.min(skip + limit))
            .map(|order| json!({ "objectId": format!("item{}", order), "fileName": "p.jpg", "order": order }))
            .collect();
        Json(json!({ "results": results }))
    }

    async fn missing_list(Path(_id): Path<String>) -> (AxumStatus, Json<Value>) {
        (AxumStatus::NOT_FOUND, Json(json!({ "code": 101, "error": "Object not found." })))
    }

    async fn failing_list_query() -> (AxumStatus, Json<Value>) {
        (AxumStatus::BAD_REQUEST, Json(json!({ "code": 119, "error": "Permission denied" })))
    }

    async fn spawn_fake_parse(shared: Shared) -> String {
        let app = Router::new()
            .route("/parse/files/:name", post(upload_file))
            .route("/parse/classes/ImageItem", post(create_item).get(query_items))
            .route("/parse/classes/ImageList", get(failing_list_query))
            .route("/parse/classes/ImageList/:id", get(missing_list))
            .route("/parse/users/me", get(current_user))
            .with_state(shared);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/parse", addr)
    }

    async fn spawn_paged_parse(shared: Shared, total: u32) -> String {
        let app = Router::new()
            .route("/parse/classes/ImageItem", get(paged_items))
            .with_state((shared, total));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/parse", addr)
    }

    fn session_client(server_url: String, token: &str) -> ParseClient {
        let config = StoreConfig {
            server_url,
            app_id: "gridscan-test".to_string(),
            rest_api_key: None,
            master_key: None,
            session_token: Some(token.to_string()),
            user_id: None,
            timeout_secs: 5,
        };
        ParseClient::new(&config).unwrap()
    }

    fn client_for(server_url: String, user_id: Option<&str>) -> ParseClient {
        let config = StoreConfig {
            server_url,
            app_id: "gridscan-test".to_string(),
            rest_api_key: Some("rest".to_string()),
            master_key: None,
            session_token: user_id.map(|_| "r:session".to_string()),
            user_id: user_id.map(str::to_string),
            timeout_secs: 5,
        };
        ParseClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_create_item_uploads_file_then_record() {
        let shared = Shared::default();
        let client = client_for(spawn_fake_parse(shared.clone()).await, None);

        let item = client
            .create_image_item(NewImageItem {
                file_name: "cell.jpg".to_string(),
                base64_data: "aGVsbG8=".to_string(),
                order: 2,
                image_list_id: "list1".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(item.id, "item1");
        assert_eq!(item.file_url.as_deref(), Some("http://files/cell.jpg"));
        assert_eq!(item.order, 2);

        let recorded = shared.lock();
        assert_eq!(recorded.app_ids, vec!["gridscan-test".to_string()]);
        let body = &recorded.created[0];
        assert_eq!(body["imageList"]["__type"], "Pointer");
        assert_eq!(body["imageList"]["objectId"], "list1");
        assert_eq!(body["file"]["__type"], "File");
        assert_eq!(body["file"]["name"], "tfss-cell.jpg");
        assert!(body.get("owner").is_none());
    }

    #[tokio::test]
    async fn test_records_are_owner_scoped_with_session() {
        let shared = Shared::default();
        let client = client_for(spawn_fake_parse(shared.clone()).await, Some("user7"));

        client
            .create_image_item(NewImageItem {
                file_name: "cell.jpg".to_string(),
                base64_data: "aGVsbG8=".to_string(),
                order: 0,
                image_list_id: "list1".to_string(),
            })
            .await
            .unwrap();
        client.list_image_items("list1").await.unwrap();

        let recorded = shared.lock();
        let body = &recorded.created[0];
        assert_eq!(body["owner"]["objectId"], "user7");
        assert_eq!(body["ACL"]["user7"]["write"], true);

        let filter: Value = serde_json::from_str(&recorded.queries[0]["where"]).unwrap();
        assert_eq!(filter["owner"]["className"], "_User");
        assert_eq!(filter["imageList"]["objectId"], "list1");
        assert_eq!(recorded.queries[0]["order"], "order");
        assert_eq!(recorded.user_lookups, 0);
    }

    #[tokio::test]
    async fn test_session_token_resolves_owner() {
        let shared = Shared::default();
        let client = session_client(spawn_fake_parse(shared.clone()).await, "r:valid");

        client
            .create_image_item(NewImageItem {
                file_name: "cell.jpg".to_string(),
                base64_data: "aGVsbG8=".to_string(),
                order: 0,
                image_list_id: "list1".to_string(),
            })
            .await
            .unwrap();
        client.clone().list_image_items("list1").await.unwrap();

        let recorded = shared.lock();
        assert_eq!(recorded.user_lookups, 1);
        assert_eq!(recorded.created[0]["owner"]["objectId"], "user9");
        assert_eq!(recorded.created[0]["ACL"]["user9"]["read"], true);
        let filter: Value = serde_json::from_str(&recorded.queries[0]["where"]).unwrap();
        assert_eq!(filter["owner"]["objectId"], "user9");
    }

    #[tokio::test]
    async fn test_invalid_session_fails_instead_of_unscoped() {
        let shared = Shared::default();
        let client = session_client(spawn_fake_parse(shared.clone()).await, "r:expired");

        match client.list_image_items("list1").await {
            Err(StoreError::Remote(message)) => assert!(message.contains("Invalid session token")),
            other => panic!("expected remote error, got {:?}", other),
        }
        assert!(shared.lock().queries.is_empty());
    }

    #[tokio::test]
    async fn test_item_listing_pages_past_one_query() {
        let shared = Shared::default();
        let client = client_for(spawn_paged_parse(shared.clone(), 2345).await, None);

        let items = client.list_image_items("list1").await.unwrap();
        assert_eq!(items.len(), 2345);
        assert_eq!(items.last().unwrap().order, 2344);

        let skips: Vec<String> = shared.lock().queries.iter().map(|q| q["skip"].clone()).collect();
        assert_eq!(skips, vec!["0", "1000", "2000"]);
    }

    #[tokio::test]
    async fn test_query_maps_records() {
        let shared = Shared::default();
        let client = client_for(spawn_fake_parse(shared.clone()).await, None);

        let item = client.find_image_item_by_order("list1", 4).await.unwrap().unwrap();
        assert_eq!(item.id, "b");
        assert_eq!(item.image_list_id, "list1");
        assert_eq!(item.file.unwrap().name, "tfss-b.jpg");
        assert_eq!(item.ocr_text, None);

        let filter: Value = serde_json::from_str(&shared.lock().queries[0]["where"]).unwrap();
        assert_eq!(filter["order"], 4);
    }

    #[tokio::test]
    async fn test_missing_object_maps_to_not_found() {
        let client = client_for(spawn_fake_parse(Shared::default()).await, None);
        let result = client.get_image_list("gone").await;
        assert!(matches!(result, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_backend_message_is_carried() {
        let client = client_for(spawn_fake_parse(Shared::default()).await, None);
        match client.list_image_lists(1, 20).await {
            Err(StoreError::Remote(message)) => assert!(message.contains("Permission denied")),
            other => panic!("expected remote error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_file_delete_requires_master_key() {
        let client = client_for("http://127.0.0.1:9".to_string(), None);
        let file = StoredFile {
            name: "tfss-a.jpg".to_string(),
            url: None,
        };
        assert!(matches!(client.delete_stored_file(&file).await, Err(StoreError::Remote(_))));
    }
}
