//! JSON-RPC client for the Zabbix API.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::api::ZabbixApi;
use super::error::{Result, ZabbixError};
use super::types::*;
use crate::config::Settings;
use crate::secrets::resolve_secret_optional;

/// Connect timeout for API requests.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Request timeout, generous because bulk exports of large templates are slow.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Serialize)]
struct RpcRequest<'a, P: Serialize> {
    jsonrpc: &'static str,
    method: &'a str,
    params: P,
    id: u64,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Deserialize)]
struct RpcError {
    code: i64,
    message: String,
    #[serde(default)]
    data: String,
}

/// Authenticated Zabbix API session.
pub struct ZabbixClient {
    http: Client,
    endpoint: String,
    auth: SecretString,
    /// Session created by `user.login`, closed again by [`ZabbixClient::logout`].
    owns_session: bool,
    version: ServerVersion,
    next_id: AtomicU64,
}

/// `{url}/api_jsonrpc.php` unless the URL already names the endpoint.
pub fn endpoint_for(url: &str) -> String {
    let url = url.trim_end_matches('/');
    if url.ends_with("api_jsonrpc.php") {
        url.to_string()
    } else {
        format!("{}/api_jsonrpc.php", url)
    }
}

fn build_http_client(settings: &Settings) -> Result<Client> {
    let mut builder = Client::builder()
        .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
        .timeout(DEFAULT_REQUEST_TIMEOUT)
        .danger_accept_invalid_certs(settings.insecure_ssl_verify);

    if let Some(path) = &settings.ca_bundle {
        let pem = std::fs::read(path).map_err(|e| ZabbixError::CaBundle {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        let certificate = reqwest::Certificate::from_pem(&pem).map_err(|e| ZabbixError::CaBundle {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        builder = builder.add_root_certificate(certificate);
    }

    builder
        .build()
        .map_err(|e| ZabbixError::Http(format!("Failed to create HTTP client: {}", e)))
}

async fn rpc<P, R>(
    http: &Client,
    endpoint: &str,
    auth: Option<&SecretString>,
    id: u64,
    method: &str,
    params: P,
) -> Result<R>
where
    P: Serialize + Send,
    R: DeserializeOwned,
{
    let request = RpcRequest {
        jsonrpc: "2.0",
        method,
        params,
        id,
    };

    let mut builder = http.post(endpoint).json(&request);
    if let Some(token) = auth {
        builder = builder.bearer_auth(token.expose_secret());
    }

    let response = builder.send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(ZabbixError::Http(format!("{} returned HTTP {}", method, status)));
    }

    let body: RpcResponse = response.json().await.map_err(|e| ZabbixError::InvalidResponse {
        method: method.to_string(),
        message: e.to_string(),
    })?;

    if let Some(error) = body.error {
        return Err(ZabbixError::Api {
            method: method.to_string(),
            code: error.code,
            message: error.message,
            data: error.data,
        });
    }

    let result = body.result.ok_or_else(|| ZabbixError::InvalidResponse {
        method: method.to_string(),
        message: "response has neither result nor error".to_string(),
    })?;

    serde_json::from_value(result).map_err(|e| ZabbixError::InvalidResponse {
        method: method.to_string(),
        message: e.to_string(),
    })
}

/// Reads the server version without authenticating.
pub async fn fetch_server_version(settings: &Settings) -> Result<ServerVersion> {
    let http = build_http_client(settings)?;
    let endpoint = endpoint_for(&settings.zabbix_url);
    let raw: String = rpc(&http, &endpoint, None, 1, "apiinfo.version", json!([])).await?;
    ServerVersion::parse(&raw)
}

/// First id of a `create` result such as `{"imageids": ["12"]}`.
fn first_created_id(method: &str, key: &str, result: &Value) -> Result<String> {
    result
        .get(key)
        .and_then(Value::as_array)
        .and_then(|ids| ids.first())
        .and_then(|id| match id {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .ok_or_else(|| ZabbixError::InvalidResponse {
            method: method.to_string(),
            message: format!("missing '{}' in result", key),
        })
}

/// Rules for `configuration.import` of templates.
pub fn template_import_rules() -> Value {
    let create_update = json!({"createMissing": true, "updateExisting": true});
    let full = json!({"createMissing": true, "updateExisting": true, "deleteMissing": true});
    json!({
        "template_groups": create_update,
        "templates": create_update,
        "templateLinkage": {"createMissing": true, "deleteMissing": true},
        "discoveryRules": full,
        "graphs": full,
        "httptests": full,
        "items": full,
        "templateDashboards": full,
        "triggers": full,
        "valueMaps": full,
    })
}

fn name_filter(names: Option<&[String]>) -> Value {
    match names {
        Some(names) => json!({ "name": names }),
        None => json!({}),
    }
}

impl ZabbixClient {
    /// Connects and authenticates, rejecting servers older than 7.0.
    ///
    /// An API token takes precedence over user and password.
    pub async fn connect(settings: &Settings) -> Result<Self> {
        let http = build_http_client(settings)?;
        let endpoint = endpoint_for(&settings.zabbix_url);

        let raw: String = rpc(&http, &endpoint, None, 1, "apiinfo.version", json!([])).await?;
        let version = ServerVersion::parse(&raw)?;
        if !version.is_supported() {
            return Err(ZabbixError::UnsupportedVersion(raw));
        }
        log::info!("Connected to Zabbix {} at {}", version, endpoint);

        let token = resolve_secret_optional(
            settings.zabbix_token.as_deref(),
            settings.zabbix_token_file.as_deref(),
        )
        .map_err(|e| ZabbixError::Authentication(e.to_string()))?;

        let (auth, owns_session) = match token {
            Some(token) => (token, false),
            None => {
                let user = settings.zabbix_user.as_deref().ok_or_else(|| {
                    ZabbixError::Authentication(
                        "no zabbix_token or zabbix_user/zabbix_password configured".to_string(),
                    )
                })?;
                let password = resolve_secret_optional(
                    settings.zabbix_password.as_deref(),
                    settings.zabbix_password_file.as_deref(),
                )
                .map_err(|e| ZabbixError::Authentication(e.to_string()))?
                .ok_or_else(|| {
                    ZabbixError::Authentication(format!("no password configured for user '{}'", user))
                })?;

                let session: String = rpc(
                    &http,
                    &endpoint,
                    None,
                    2,
                    "user.login",
                    json!({"username": user, "password": password.expose_secret()}),
                )
                .await
                .map_err(|e| ZabbixError::Authentication(e.to_string()))?;
                (SecretString::from(session), true)
            }
        };

        Ok(Self {
            http,
            endpoint,
            auth,
            owns_session,
            version,
            next_id: AtomicU64::new(3),
        })
    }

    /// Ends a session opened with user and password. Tokens are left alone.
    pub async fn logout(&self) -> Result<()> {
        if self.owns_session {
            let _: bool = self.call("user.logout", json!([])).await?;
        }
        Ok(())
    }

    async fn call<P, R>(&self, method: &str, params: P) -> Result<R>
    where
        P: Serialize + Send,
        R: DeserializeOwned,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        log::trace!("Zabbix API call {} (id {})", method, id);
        rpc(&self.http, &self.endpoint, Some(&self.auth), id, method, params).await
    }

    async fn create(&self, method: &str, id_key: &str, params: Value) -> Result<String> {
        let result: Value = self.call(method, params).await?;
        first_created_id(method, id_key, &result)
    }

    async fn call_ids(&self, method: &str, ids: &[String]) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let _: Value = self.call(method, ids).await?;
        Ok(())
    }
}

fn to_params<T: Serialize>(method: &str, value: &T) -> Result<Value> {
    serde_json::to_value(value).map_err(|e| ZabbixError::InvalidResponse {
        method: method.to_string(),
        message: format!("failed to encode parameters: {}", e),
    })
}

#[async_trait]
impl ZabbixApi for ZabbixClient {
    fn server_version(&self) -> ServerVersion {
        self.version
    }

    async fn get_template_groups(&self, root: &str) -> Result<Vec<TemplateGroupSummary>> {
        let groups: Vec<TemplateGroupSummary> = self
            .call(
                "templategroup.get",
                json!({
                    "output": ["groupid", "name"],
                    "search": {"name": root},
                    "startSearch": true,
                }),
            )
            .await?;
        let nested = format!("{}/", root);
        Ok(groups
            .into_iter()
            .filter(|g| g.name == root || g.name.starts_with(&nested))
            .collect())
    }

    async fn get_templates(
        &self,
        group_ids: &[String],
        names: Option<&[String]>,
    ) -> Result<Vec<TemplateSummary>> {
        let mut params = json!({
            "output": ["templateid", "host"],
            "groupids": group_ids,
        });
        if let Some(names) = names {
            params["filter"] = json!({ "host": names });
        }
        self.call("template.get", params).await
    }

    async fn export_templates(&self, template_ids: &[String]) -> Result<String> {
        self.call(
            "configuration.export",
            json!({
                "options": {"templates": template_ids},
                "format": "yaml",
            }),
        )
        .await
    }

    async fn import_templates(&self, source: &str) -> Result<()> {
        let _: Value = self
            .call(
                "configuration.import",
                json!({
                    "format": "yaml",
                    "rules": template_import_rules(),
                    "source": source,
                }),
            )
            .await?;
        Ok(())
    }

    async fn update_template_vendor(
        &self,
        template_id: &str,
        vendor_name: &str,
        vendor_version: &str,
    ) -> Result<()> {
        let _: Value = self
            .call(
                "template.update",
                json!({
                    "templateid": template_id,
                    "vendor_name": vendor_name,
                    "vendor_version": vendor_version,
                }),
            )
            .await?;
        Ok(())
    }

    async fn delete_templates(&self, template_ids: &[String]) -> Result<()> {
        self.call_ids("template.delete", template_ids).await
    }

    async fn get_images(&self, names: Option<&[String]>) -> Result<Vec<ImageObject>> {
        self.call(
            "image.get",
            json!({
                "output": "extend",
                "select_image": true,
                "filter": name_filter(names),
            }),
        )
        .await
    }

    async fn create_image(&self, image: &ImageObject) -> Result<String> {
        let params = to_params("image.create", image)?;
        self.create("image.create", "imageids", params).await
    }

    async fn update_image(&self, image: &ImageObject) -> Result<()> {
        let _: Value = self
            .call(
                "image.update",
                json!({"imageid": image.imageid, "image": image.image}),
            )
            .await?;
        Ok(())
    }

    async fn delete_images(&self, image_ids: &[String]) -> Result<()> {
        self.call_ids("image.delete", image_ids).await
    }

    async fn get_icon_maps(&self, names: Option<&[String]>) -> Result<Vec<IconMapObject>> {
        self.call(
            "iconmap.get",
            json!({
                "output": "extend",
                "selectMappings": "extend",
                "filter": name_filter(names),
            }),
        )
        .await
    }

    async fn create_icon_map(&self, icon_map: &IconMapObject) -> Result<String> {
        let params = to_params("iconmap.create", icon_map)?;
        self.create("iconmap.create", "iconmapids", params).await
    }

    async fn update_icon_map(&self, icon_map: &IconMapObject) -> Result<()> {
        let params = to_params("iconmap.update", icon_map)?;
        let _: Value = self.call("iconmap.update", params).await?;
        Ok(())
    }

    async fn delete_icon_maps(&self, icon_map_ids: &[String]) -> Result<()> {
        self.call_ids("iconmap.delete", icon_map_ids).await
    }

    async fn get_scripts(&self, names: Option<&[String]>) -> Result<Vec<ScriptObject>> {
        self.call(
            "script.get",
            json!({
                "output": "extend",
                "filter": name_filter(names),
            }),
        )
        .await
    }

    async fn create_script(&self, script: &ScriptObject) -> Result<String> {
        let mut params = to_params("script.create", script)?;
        if let Some(map) = params.as_object_mut() {
            map.remove("scriptid");
        }
        self.create("script.create", "scriptids", params).await
    }

    async fn update_script(&self, script: &ScriptObject) -> Result<()> {
        let params = to_params("script.update", script)?;
        let _: Value = self.call("script.update", params).await?;
        Ok(())
    }

    async fn delete_scripts(&self, script_ids: &[String]) -> Result<()> {
        self.call_ids("script.delete", script_ids).await
    }

    async fn get_user_groups(&self) -> Result<Vec<UserGroup>> {
        self.call("usergroup.get", json!({"output": ["usrgrpid", "name"]}))
            .await
    }

    async fn get_global_macros(&self, names: Option<&[String]>) -> Result<Vec<GlobalMacroObject>> {
        let mut params = json!({
            "output": "extend",
            "globalmacro": true,
        });
        if let Some(names) = names {
            params["filter"] = json!({ "macro": names });
        }
        self.call("usermacro.get", params).await
    }

    async fn create_global_macro(&self, global_macro: &GlobalMacroObject) -> Result<String> {
        let params = to_params("usermacro.createglobal", global_macro)?;
        self.create("usermacro.createglobal", "globalmacroids", params)
            .await
    }

    async fn update_global_macro(&self, global_macro: &GlobalMacroObject) -> Result<()> {
        let params = to_params("usermacro.updateglobal", global_macro)?;
        let _: Value = self.call("usermacro.updateglobal", params).await?;
        Ok(())
    }

    async fn delete_global_macros(&self, global_macro_ids: &[String]) -> Result<()> {
        self.call_ids("usermacro.deleteglobal", global_macro_ids)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn settings_for(server: &MockServer) -> Settings {
        Settings {
            zabbix_url: server.uri(),
            zabbix_token: Some("api-token".to_string()),
            ..Default::default()
        }
    }

    async fn mount_version(server: &MockServer, version: &str) {
        Mock::given(method("POST"))
            .and(path("/api_jsonrpc.php"))
            .and(body_partial_json(json!({"method": "apiinfo.version"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"jsonrpc": "2.0", "result": version, "id": 1})),
            )
            .mount(server)
            .await;
    }

    #[test]
    fn test_endpoint_for() {
        assert_eq!(endpoint_for("http://zbx/"), "http://zbx/api_jsonrpc.php");
        assert_eq!(endpoint_for("http://zbx/api_jsonrpc.php"), "http://zbx/api_jsonrpc.php");
    }

    #[test]
    fn test_first_created_id() {
        let result = json!({"imageids": ["17"]});
        assert_eq!(first_created_id("image.create", "imageids", &result).unwrap(), "17");
        let result = json!({"imageids": [18]});
        assert_eq!(first_created_id("image.create", "imageids", &result).unwrap(), "18");
        assert!(first_created_id("image.create", "imageids", &json!({})).is_err());
    }

    #[tokio::test]
    async fn test_connect_with_token() {
        let server = MockServer::start().await;
        mount_version(&server, "7.0.5").await;

        let client = ZabbixClient::connect(&settings_for(&server)).await.unwrap();
        assert_eq!(client.server_version().short(), "7.0");
    }

    #[tokio::test]
    async fn test_connect_rejects_old_server() {
        let server = MockServer::start().await;
        mount_version(&server, "6.4.8").await;

        let err = ZabbixClient::connect(&settings_for(&server))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ZabbixError::UnsupportedVersion(v) if v == "6.4.8"));
    }

    #[tokio::test]
    async fn test_connect_with_password_and_bearer_auth() {
        let server = MockServer::start().await;
        mount_version(&server, "7.2.1").await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "method": "user.login",
                "params": {"username": "Admin", "password": "zabbix"}
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"jsonrpc": "2.0", "result": "session-1", "id": 2})),
            )
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(header("authorization", "Bearer session-1"))
            .and(body_partial_json(json!({"method": "usergroup.get"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "result": [{"usrgrpid": "7", "name": "Zabbix administrators"}],
                "id": 3
            })))
            .mount(&server)
            .await;

        let settings = Settings {
            zabbix_url: server.uri(),
            zabbix_user: Some("Admin".to_string()),
            zabbix_password: Some("zabbix".to_string()),
            ..Default::default()
        };
        let client = ZabbixClient::connect(&settings).await.unwrap();
        let groups = client.get_user_groups().await.unwrap();
        assert_eq!(groups[0].usrgrpid, "7");
    }

    #[tokio::test]
    async fn test_connect_without_credentials() {
        let server = MockServer::start().await;
        mount_version(&server, "7.0.0").await;

        let settings = Settings {
            zabbix_url: server.uri(),
            ..Default::default()
        };
        let err = ZabbixClient::connect(&settings).await.err().unwrap();
        assert!(matches!(err, ZabbixError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_api_error_is_surfaced() {
        let server = MockServer::start().await;
        mount_version(&server, "7.0.0").await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "template.delete"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "error": {"code": -32602, "message": "Invalid params.", "data": "No permissions."},
                "id": 3
            })))
            .mount(&server)
            .await;

        let client = ZabbixClient::connect(&settings_for(&server)).await.unwrap();
        let err = client.delete_templates(&["10".to_string()]).await.unwrap_err();
        match err {
            ZabbixError::Api { code, data, .. } => {
                assert_eq!(code, -32602);
                assert_eq!(data, "No permissions.");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_create_image_returns_id() {
        let server = MockServer::start().await;
        mount_version(&server, "7.0.0").await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "method": "image.create",
                "params": {"name": "server_(64)", "imagetype": "1"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "result": {"imageids": ["42"]},
                "id": 3
            })))
            .mount(&server)
            .await;

        let client = ZabbixClient::connect(&settings_for(&server)).await.unwrap();
        let id = client
            .create_image(&ImageObject {
                imageid: None,
                name: "server_(64)".to_string(),
                imagetype: IMAGE_TYPE_ICON.to_string(),
                image: Some("aGVsbG8=".to_string()),
            })
            .await
            .unwrap();
        assert_eq!(id, "42");
    }

    #[tokio::test]
    async fn test_template_groups_are_limited_to_root() {
        let server = MockServer::start().await;
        mount_version(&server, "7.0.0").await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "templategroup.get"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "result": [
                    {"groupid": "1", "name": "Templates"},
                    {"groupid": "2", "name": "Templates/Linux"},
                    {"groupid": "3", "name": "TemplatesOther"}
                ],
                "id": 3
            })))
            .mount(&server)
            .await;

        let client = ZabbixClient::connect(&settings_for(&server)).await.unwrap();
        let groups = client.get_template_groups("Templates").await.unwrap();
        let names: Vec<_> = groups.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["Templates", "Templates/Linux"]);
    }

    #[tokio::test]
    async fn test_fetch_server_version_without_credentials() {
        let server = MockServer::start().await;
        mount_version(&server, "7.4.0").await;
        let settings = Settings {
            zabbix_url: server.uri(),
            ..Default::default()
        };
        assert_eq!(fetch_server_version(&settings).await.unwrap().short(), "7.4");
    }
}
