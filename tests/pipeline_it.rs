#![cfg(feature = "reqwest")]

// crates.io
use httpmock::prelude::*;
use serde_json::json;
// self
use compliance_client::{
	_preludet::*,
	auth::{Credential, SigningKeys},
	client::ApiRequest,
	error::{ResponseError, TransportError},
	session::ReauthReason,
};

fn seed(client: &compliance_client::client::ApiClient, access: &str) {
	client
		.credentials()
		.set(Credential::new(access).with_renewal_token("renew-1"), None)
		.expect("Seeding the credential store should succeed.");
}

#[tokio::test]
async fn bearer_token_is_attached() {
	let server = MockServer::start_async().await;
	let (client, _, _) = build_test_client(test_config(&server.base_url()));
	let mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/reports").header("authorization", "Bearer token-1");
			then.status(200).header("content-type", "application/json").body("[]");
		})
		.await;

	seed(&client, "token-1");

	let reports: Vec<serde_json::Value> =
		client.get_json("/reports").await.expect("Bearer request should succeed.");

	mock.assert_async().await;

	assert!(reports.is_empty());
}

#[tokio::test]
async fn signed_headers_are_used_without_a_token() {
	let server = MockServer::start_async().await;
	let mut config = test_config(&server.base_url());

	config.signing = Some(SigningKeys::new("access-key-1", "secret-key-1").with_session_id("sid-1"));

	let (client, _, _) = build_test_client(config);
	let mock = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/reports")
				.header("access-key", "access-key-1")
				.header("session-id", "sid-1")
				.header_exists("timestamp")
				.header_exists("signature");
			then.status(200).body("[]");
		})
		.await;

	client.send(ApiRequest::get("/reports")).await.expect("Signed request should succeed.");

	mock.assert_async().await;
}

#[tokio::test]
async fn rejected_request_refreshes_and_retries_once() {
	let server = MockServer::start_async().await;
	let (client, _, navigator) = build_test_client(test_config(&server.base_url()));
	let rejected = server
		.mock_async(|when, then| {
			when.method(GET).path("/reports").header("authorization", "Bearer old");
			then.status(401);
		})
		.await;
	let accepted = server
		.mock_async(|when, then| {
			when.method(GET).path("/reports").header("authorization", "Bearer new");
			then.status(200).json_body(json!([{ "id": 1 }]));
		})
		.await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/refresh").json_body(json!({ "refresh_token": "renew-1" }));
			then.status(200).json_body(json!({
				"session_token": "new",
				"refresh_token": "renew-2",
				"expires_in": 3600
			}));
		})
		.await;

	seed(&client, "old");

	let reports: Vec<serde_json::Value> =
		client.get_json("/reports").await.expect("Retried request should succeed.");

	rejected.assert_async().await;
	accepted.assert_async().await;
	refresh.assert_async().await;

	assert_eq!(reports.len(), 1);
	assert!(navigator.redirects().is_empty());

	let stored = client
		.credentials()
		.get()
		.expect("Store read should succeed.")
		.expect("Refreshed credential should be stored.");

	assert_eq!(stored.access_token.expose(), "new");
	assert_eq!(stored.renewal_token.as_ref().map(|token| token.expose()), Some("renew-2"));
	assert!(stored.expires_at.is_some());
}

#[tokio::test]
async fn second_rejection_invalidates_the_session() {
	let server = MockServer::start_async().await;
	let (client, store, navigator) = build_test_client(test_config(&server.base_url()));
	let reports = server
		.mock_async(|when, then| {
			when.method(GET).path("/reports");
			then.status(401);
		})
		.await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/refresh");
			then.status(200).json_body(json!({ "session_token": "new" }));
		})
		.await;

	seed(&client, "old");

	let err = client.send(ApiRequest::get("/reports")).await.expect_err("Session should be invalid.");

	assert!(matches!(err, Error::SessionInvalid { reason: ReauthReason::Expired }));

	reports.assert_calls_async(2).await;
	refresh.assert_calls_async(1).await;

	let redirects = navigator.redirects();

	assert_eq!(redirects.len(), 1);
	assert_eq!(redirects[0].location.query(), Some("reason=expired"));
	assert!(store.keys().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_rejections_share_one_refresh() {
	let server = MockServer::start_async().await;
	let (client, _, navigator) = build_test_client(test_config(&server.base_url()));

	server
		.mock_async(|when, then| {
			when.method(GET).path("/reports").header("authorization", "Bearer old");
			then.status(401);
		})
		.await;
	let accepted = server
		.mock_async(|when, then| {
			when.method(GET).path("/reports").header("authorization", "Bearer new");
			then.status(200).body("[]");
		})
		.await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/refresh");
			then.status(200)
				.delay(StdDuration::from_millis(300))
				.json_body(json!({ "session_token": "new" }));
		})
		.await;

	seed(&client, "old");

	let results = futures::future::join_all((0..5).map(|_| {
		let client = client.clone();

		async move { client.send(ApiRequest::get("/reports")).await }
	}))
	.await;

	for result in results {
		result.expect("Every concurrent request should succeed after the shared refresh.");
	}

	refresh.assert_calls_async(1).await;
	accepted.assert_calls_async(5).await;

	assert_eq!(client.refresher().metrics().attempts(), 1);
	assert!(navigator.redirects().is_empty());
}

#[tokio::test]
async fn failed_refresh_keeps_store_then_redirects() {
	let server = MockServer::start_async().await;
	let (client, _, navigator) = build_test_client(test_config(&server.base_url()));
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/refresh");
			then.status(500).json_body(json!({ "error": "upstream unavailable" }));
		})
		.await;
	let reports = server
		.mock_async(|when, then| {
			when.method(GET).path("/reports");
			then.status(401);
		})
		.await;

	seed(&client, "old");

	let before = client.credentials().get().expect("Store read should succeed.");

	assert!(client.refresher().refresh().await.is_none());
	assert_eq!(client.credentials().get().expect("Store read should succeed."), before);

	let err = client.send(ApiRequest::get("/reports")).await.expect_err("Session should be invalid.");

	assert!(matches!(err, Error::SessionInvalid { reason: ReauthReason::RefreshFailed }));

	refresh.assert_calls_async(2).await;
	reports.assert_calls_async(1).await;

	assert_eq!(navigator.redirects().len(), 1);
	assert!(client.credentials().get().expect("Store read should succeed.").is_none());
}

#[tokio::test]
async fn non_success_statuses_become_structured_errors() {
	let server = MockServer::start_async().await;
	let (client, _, navigator) = build_test_client(test_config(&server.base_url()));

	server
		.mock_async(|when, then| {
			when.method(POST).path("/scanner/scan");
			then.status(422).json_body(json!({ "message": "URL is not reachable" }));
		})
		.await;
	seed(&client, "token-1");

	let err = client
		.post_json::<_, serde_json::Value>("/scanner/scan", &json!({ "url": "nope" }))
		.await
		.expect_err("422 should surface as an error.");

	match err {
		Error::Response(ResponseError::Status { status, body, message }) => {
			assert_eq!(status, 422);
			assert_eq!(message, "URL is not reachable");
			assert!(body.is_some());
		},
		other => panic!("Unexpected error: {other:?}."),
	}

	assert!(navigator.redirects().is_empty());
}

#[tokio::test]
async fn malformed_json_is_a_distinct_error() -> color_eyre::Result<()> {
	let server = MockServer::start_async().await;
	let (client, _, _) = build_test_client(test_config(&server.base_url()));

	server
		.mock_async(|when, then| {
			when.method(GET).path("/reports");
			then.status(200).header("content-type", "text/html").body("<html>maintenance</html>");
		})
		.await;
	seed(&client, "token-1");

	let response = client.send(ApiRequest::get("/reports")).await?;

	assert_eq!(response.status(), 200);
	assert!(matches!(
		response.json::<serde_json::Value>(),
		Err(ResponseError::Malformed { status: 200, .. })
	));

	Ok(())
}

#[tokio::test]
async fn slow_backend_times_out() {
	let server = MockServer::start_async().await;
	let (client, _, _) = build_test_client(test_config(&server.base_url()));

	server
		.mock_async(|when, then| {
			when.method(GET).path("/reports");
			then.status(200).delay(StdDuration::from_secs(3)).body("[]");
		})
		.await;
	seed(&client, "token-1");

	let err = client
		.send(ApiRequest::get("/reports").timeout(StdDuration::from_millis(200)))
		.await
		.expect_err("Slow responses should time out.");

	assert!(matches!(err, Error::Transport(TransportError::Timeout { .. })));
}

#[tokio::test]
async fn login_stores_credential_and_logout_clears_it() {
	let server = MockServer::start_async().await;
	let (client, _, navigator) = build_test_client(test_config(&server.base_url()));
	let login = server
		.mock_async(|when, then| {
			when.method(GET).path("/auth/login").query_param("code", "auth-code-1");
			then.status(200).json_body(json!({
				"access_token": "issued",
				"refresh_token": "renew-1",
				"expires_in": 900
			}));
		})
		.await;
	let logout = server
		.mock_async(|when, then| {
			when.method(GET).path("/auth/logout").header("authorization", "Bearer issued");
			then.status(204);
		})
		.await;
	let credential = client.login([("code", "auth-code-1")]).await.expect("Login should succeed.");

	login.assert_async().await;

	assert_eq!(credential.access_token.expose(), "issued");
	assert!(credential.expires_at.is_some());

	client.logout().await.expect("Logout should succeed.");
	logout.assert_async().await;

	assert!(client.credentials().get().expect("Store read should succeed.").is_none());
	assert_eq!(navigator.redirects()[0].reason, ReauthReason::LoggedOut);
}
