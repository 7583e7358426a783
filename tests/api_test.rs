// Integration tests for API endpoints
// These tests need a running MongoDB instance (MONGODB_URI)
// Run with: cargo test --test api_test

use actix_web::{http::StatusCode, test, web, App};
use milkway_api::{
    api,
    config::Config,
    db,
    models::{AuthResponse, FarmListResponse},
};
use mongodb::bson::oid::ObjectId;
use serde_json::json;

const BOUNDARY: &str = "----MilkWayTestBoundary4yN8wQ";

/// Generate unique test identifier using nanoseconds for better uniqueness
fn generate_test_id() -> String {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_nanos()
        .to_string()
}

/// Helper function to create a test app
async fn create_test_app() -> App<
    impl actix_web::dev::ServiceFactory<
        actix_web::dev::ServiceRequest,
        Config = (),
        Response = actix_web::dev::ServiceResponse,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    let config = Config::from_env().expect("Failed to load configuration");
    let mongodb_db = db::create_mongodb_client(&config)
        .await
        .expect("Failed to create MongoDB client");
    db::ensure_indexes(&mongodb_db)
        .await
        .expect("Failed to create MongoDB indexes");

    App::new()
        .app_data(web::Data::new(config))
        .app_data(web::Data::new(mongodb_db))
        .configure(api::configure)
}

/// Encode text fields as a multipart/form-data body.
fn multipart_body(fields: &[(&str, String)]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        body.extend_from_slice(
            format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
        );
        body.extend_from_slice(value.as_bytes());
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn multipart_content_type() -> (&'static str, String) {
    (
        "Content-Type",
        format!("multipart/form-data; boundary={}", BOUNDARY),
    )
}

/// A complete, valid farm form.
fn farm_fields(name: &str) -> Vec<(&'static str, String)> {
    vec![
        ("name", name.to_string()),
        (
            "description",
            "Fresh A2 milk from grass-fed cows, delivered every morning.".to_string(),
        ),
        ("price", "45".to_string()),
        (
            "location",
            r#"{"address":"12 Dairy Lane","city":"Pune","state":"Maharashtra","pincode":"411001","coordinates":{"lat":18.52,"lng":73.85}}"#
                .to_string(),
        ),
        ("contact", r#"{"phone":"9876543210"}"#.to_string()),
        ("availability", r#"["morning","evening"]"#.to_string()),
        ("features", r#"["organic","home-delivery"]"#.to_string()),
    ]
}

#[actix_web::test]
async fn test_health() {
    let app = test::init_service(create_test_app().await).await;

    let req = test::TestRequest::get().uri("/api/health").to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK, "Health should return 200 OK");

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "OK", "Health status should be OK");
}

#[actix_web::test]
async fn test_register() {
    let app = test::init_service(create_test_app().await).await;

    let test_id = generate_test_id();
    let email = format!("farmer{}@example.com", test_id);

    let register_req = json!({
        "name": "Test Farmer",
        "email": email,
        "password": "password123",
        "role": "farmer"
    });

    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(&register_req)
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(
        resp.status(),
        StatusCode::CREATED,
        "Register should return 201 CREATED"
    );

    let body: AuthResponse = test::read_body_json(resp).await;
    assert!(!body.token.is_empty(), "Token should not be empty");
    assert_eq!(body.user.email, email, "Email should match");
    assert!(body.user.is_active, "New account should be active");
}

#[actix_web::test]
async fn test_register_duplicate_email() {
    let app = test::init_service(create_test_app().await).await;

    let test_id = generate_test_id();
    let email = format!("duplicate{}@example.com", test_id);

    let register_req = json!({
        "name": "Duplicate User",
        "email": email,
        "password": "password123",
        "role": "buyer"
    });

    // First registration
    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(&register_req)
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    // Try to register again with same email
    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(&register_req)
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(
        resp.status(),
        StatusCode::BAD_REQUEST,
        "Duplicate registration should return 400"
    );

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "User already exists with this email");
}

#[actix_web::test]
async fn test_register_short_password() {
    let app = test::init_service(create_test_app().await).await;

    let test_id = generate_test_id();
    let register_req = json!({
        "name": "Short Password",
        "email": format!("short{}@example.com", test_id),
        "password": "123",
        "role": "buyer"
    });

    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(&register_req)
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(
        resp.status(),
        StatusCode::BAD_REQUEST,
        "Short password should return 400"
    );

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert!(
        body["errors"]
            .as_array()
            .map(|errs| errs.iter().any(|e| e["field"] == "password"))
            .unwrap_or(false),
        "Error list should name the password field"
    );
}

#[actix_web::test]
async fn test_login() {
    let app = test::init_service(create_test_app().await).await;

    let test_id = generate_test_id();
    let email = format!("login{}@example.com", test_id);
    let password = "password123".to_string();

    let register_req = json!({
        "name": "Login User",
        "email": email,
        "password": password,
        "role": "buyer"
    });

    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(&register_req)
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    // Now try to login
    let login_req = json!({
        "email": email,
        "password": password
    });

    let req = test::TestRequest::post()
        .uri("/api/auth/login")
        .set_json(&login_req)
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK, "Login should return 200 OK");

    let body: AuthResponse = test::read_body_json(resp).await;
    assert!(!body.token.is_empty(), "Token should not be empty");
    assert_eq!(body.user.email, email, "Email should match");
}

#[actix_web::test]
async fn test_login_wrong_password() {
    let app = test::init_service(create_test_app().await).await;

    let test_id = generate_test_id();
    let email = format!("wrongpass{}@example.com", test_id);

    let register_req = json!({
        "name": "Wrong Password",
        "email": email,
        "password": "correctpassword",
        "role": "buyer"
    });

    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(&register_req)
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let login_req = json!({
        "email": email,
        "password": "wrongpassword"
    });

    let req = test::TestRequest::post()
        .uri("/api/auth/login")
        .set_json(&login_req)
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn test_login_unknown_email() {
    let app = test::init_service(create_test_app().await).await;

    let login_req = json!({
        "email": format!("nobody{}@example.com", generate_test_id()),
        "password": "whatever123"
    });

    let req = test::TestRequest::post()
        .uri("/api/auth/login")
        .set_json(&login_req)
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(
        resp.status(),
        StatusCode::UNAUTHORIZED,
        "Unknown email should return 401, not reveal which part was wrong"
    );
}

#[actix_web::test]
async fn test_me_requires_token() {
    let app = test::init_service(create_test_app().await).await;

    let req = test::TestRequest::get().uri("/api/auth/me").to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn test_me_returns_current_user() {
    let app = test::init_service(create_test_app().await).await;

    let test_id = generate_test_id();
    let email = format!("me{}@example.com", test_id);

    let register_req = json!({
        "name": "Me User",
        "email": email,
        "password": "password123",
        "role": "buyer"
    });

    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(&register_req)
        .to_request();

    let resp = test::call_service(&app, req).await;
    let body: AuthResponse = test::read_body_json(resp).await;
    let token = body.token;

    let req = test::TestRequest::get()
        .uri("/api/auth/me")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["user"]["email"], email.as_str(), "Email should match");
}

#[actix_web::test]
async fn test_create_farm() {
    let app = test::init_service(create_test_app().await).await;

    let test_id = generate_test_id();
    let register_req = json!({
        "name": "Farm Owner",
        "email": format!("owner{}@example.com", test_id),
        "password": "password123",
        "role": "farmer"
    });

    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(&register_req)
        .to_request();

    let resp = test::call_service(&app, req).await;
    let body: AuthResponse = test::read_body_json(resp).await;
    let token = body.token;

    let farm_name = format!("Green Meadows {}", test_id);
    let req = test::TestRequest::post()
        .uri("/api/farms")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .insert_header(multipart_content_type())
        .set_payload(multipart_body(&farm_fields(&farm_name)))
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(
        resp.status(),
        StatusCode::CREATED,
        "Create farm should return 201 CREATED"
    );

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "Farm created successfully");
    assert_eq!(body["farm"]["name"], farm_name.as_str());
    assert_eq!(body["farm"]["price"], 45.0);
    assert_eq!(body["farm"]["views"], 0);
    assert_eq!(body["farm"]["ratings"]["count"], 0);
    assert_eq!(
        body["farm"]["canEdit"], true,
        "Creator should be allowed to edit"
    );
}

#[actix_web::test]
async fn test_create_farm_requires_farmer_role() {
    let app = test::init_service(create_test_app().await).await;

    let test_id = generate_test_id();
    let register_req = json!({
        "name": "Just A Buyer",
        "email": format!("buyerfarm{}@example.com", test_id),
        "password": "password123",
        "role": "buyer"
    });

    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(&register_req)
        .to_request();

    let resp = test::call_service(&app, req).await;
    let body: AuthResponse = test::read_body_json(resp).await;
    let token = body.token;

    let req = test::TestRequest::post()
        .uri("/api/farms")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .insert_header(multipart_content_type())
        .set_payload(multipart_body(&farm_fields("Buyer Farm")))
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(
        resp.status(),
        StatusCode::FORBIDDEN,
        "Buyers must not create farms"
    );
}

#[actix_web::test]
async fn test_create_farm_unauthorized() {
    let app = test::init_service(create_test_app().await).await;

    let req = test::TestRequest::post()
        .uri("/api/farms")
        .insert_header(multipart_content_type())
        .set_payload(multipart_body(&farm_fields("No Token Farm")))
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn test_create_farm_missing_contact() {
    let app = test::init_service(create_test_app().await).await;

    let test_id = generate_test_id();
    let register_req = json!({
        "name": "Farm Owner",
        "email": format!("nocontact{}@example.com", test_id),
        "password": "password123",
        "role": "farmer"
    });

    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(&register_req)
        .to_request();

    let resp = test::call_service(&app, req).await;
    let body: AuthResponse = test::read_body_json(resp).await;
    let token = body.token;

    let mut fields = farm_fields("Missing Contact Farm");
    fields.retain(|(name, _)| *name != "contact");

    let req = test::TestRequest::post()
        .uri("/api/farms")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .insert_header(multipart_content_type())
        .set_payload(multipart_body(&fields))
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "Contact information is required");
}

#[actix_web::test]
async fn test_get_farm_by_id() {
    let app = test::init_service(create_test_app().await).await;

    let test_id = generate_test_id();
    let register_req = json!({
        "name": "Farm Owner",
        "email": format!("getfarm{}@example.com", test_id),
        "password": "password123",
        "role": "farmer"
    });

    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(&register_req)
        .to_request();

    let resp = test::call_service(&app, req).await;
    let body: AuthResponse = test::read_body_json(resp).await;
    let token = body.token;

    let farm_name = format!("Hill View Dairy {}", test_id);
    let req = test::TestRequest::post()
        .uri("/api/farms")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .insert_header(multipart_content_type())
        .set_payload(multipart_body(&farm_fields(&farm_name)))
        .to_request();

    let resp = test::call_service(&app, req).await;
    let body: serde_json::Value = test::read_body_json(resp).await;
    let farm_id = body["farm"]["id"].as_str().unwrap().to_string();

    // Fetch without authentication
    let req = test::TestRequest::get()
        .uri(&format!("/api/farms/{}", farm_id))
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let farm: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(farm["name"], farm_name.as_str());
    assert_eq!(
        farm["canEdit"], false,
        "Anonymous viewers cannot edit anything"
    );

    // Malformed id
    let req = test::TestRequest::get()
        .uri("/api/farms/not-an-id")
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // Well-formed but unknown id
    let req = test::TestRequest::get()
        .uri(&format!("/api/farms/{}", ObjectId::new().to_hex()))
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_list_farms_with_pagination() {
    let app = test::init_service(create_test_app().await).await;

    let test_id = generate_test_id();
    let register_req = json!({
        "name": "Prolific Farmer",
        "email": format!("pages{}@example.com", test_id),
        "password": "password123",
        "role": "farmer"
    });

    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(&register_req)
        .to_request();

    let resp = test::call_service(&app, req).await;
    let body: AuthResponse = test::read_body_json(resp).await;
    let token = body.token;

    // Six farms sharing a unique needle, so the search filter isolates
    // this test's data from whatever else is in the collection.
    for i in 0..6 {
        let req = test::TestRequest::post()
            .uri("/api/farms")
            .insert_header(("Authorization", format!("Bearer {}", token)))
            .insert_header(multipart_content_type())
            .set_payload(multipart_body(&farm_fields(&format!(
                "Paged Farm {} {}",
                i, test_id
            ))))
            .to_request();

        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::CREATED);
    }

    let req = test::TestRequest::get()
        .uri(&format!("/api/farms?search={}&page=1&limit=5", test_id))
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(
        resp.status(),
        StatusCode::OK,
        "List farms should return 200 OK"
    );

    let body: FarmListResponse = test::read_body_json(resp).await;
    assert_eq!(body.farms.len(), 5, "First page carries the full limit");
    assert_eq!(body.pagination.current_page, 1);
    assert_eq!(body.pagination.total_farms, 6);
    assert_eq!(body.pagination.total_pages, 2);
    assert!(body.pagination.has_next);
    assert!(!body.pagination.has_prev);

    // The second page holds the remainder, under the same total
    let req = test::TestRequest::get()
        .uri(&format!("/api/farms?search={}&page=2&limit=5", test_id))
        .to_request();

    let resp = test::call_service(&app, req).await;
    let body: FarmListResponse = test::read_body_json(resp).await;
    assert_eq!(body.farms.len(), 1);
    assert_eq!(body.pagination.current_page, 2);
    assert_eq!(body.pagination.total_farms, 6);
    assert!(!body.pagination.has_next);
    assert!(body.pagination.has_prev);

    // An unpaginated fetch under the same filter agrees with totalFarms
    let req = test::TestRequest::get()
        .uri(&format!("/api/farms?search={}&limit=100", test_id))
        .to_request();

    let resp = test::call_service(&app, req).await;
    let body: FarmListResponse = test::read_body_json(resp).await;
    assert_eq!(body.farms.len() as u64, body.pagination.total_farms);
    assert_eq!(body.pagination.total_farms, 6);

    // Fresh farms have a zero average, so a minRating bar excludes them all
    let req = test::TestRequest::get()
        .uri(&format!("/api/farms?search={}&minRating=4", test_id))
        .to_request();

    let resp = test::call_service(&app, req).await;
    let body: FarmListResponse = test::read_body_json(resp).await;
    assert!(body.farms.is_empty());
    assert_eq!(body.pagination.total_farms, 0);
}

#[actix_web::test]
async fn test_search_farms() {
    let app = test::init_service(create_test_app().await).await;

    let test_id = generate_test_id();
    let register_req = json!({
        "name": "Farm Owner",
        "email": format!("search{}@example.com", test_id),
        "password": "password123",
        "role": "farmer"
    });

    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(&register_req)
        .to_request();

    let resp = test::call_service(&app, req).await;
    let body: AuthResponse = test::read_body_json(resp).await;
    let token = body.token;

    let farm_name = format!("Sunrise Dairy {}", test_id);
    let req = test::TestRequest::post()
        .uri("/api/farms")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .insert_header(multipart_content_type())
        .set_payload(multipart_body(&farm_fields(&farm_name)))
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    // A one-character query is rejected
    let req = test::TestRequest::get()
        .uri("/api/farms/search?q=a")
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    // The unique id only appears in the farm we just created
    let req = test::TestRequest::get()
        .uri(&format!("/api/farms/search?q={}", test_id))
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert!(
        body["total"].as_u64().unwrap() >= 1,
        "Search should find the new farm"
    );
    assert_eq!(body["farms"][0]["name"], farm_name.as_str());
}

#[actix_web::test]
async fn test_my_farms() {
    let app = test::init_service(create_test_app().await).await;

    let test_id = generate_test_id();
    let register_req = json!({
        "name": "Farm Owner",
        "email": format!("myfarms{}@example.com", test_id),
        "password": "password123",
        "role": "farmer"
    });

    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(&register_req)
        .to_request();

    let resp = test::call_service(&app, req).await;
    let body: AuthResponse = test::read_body_json(resp).await;
    let token = body.token;

    let req = test::TestRequest::post()
        .uri("/api/farms")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .insert_header(multipart_content_type())
        .set_payload(multipart_body(&farm_fields(&format!(
            "My Farm {}",
            test_id
        ))))
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let req = test::TestRequest::get()
        .uri("/api/farms/my-farms")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(
        body["total"].as_u64().unwrap(),
        1,
        "A fresh farmer should see exactly their one farm"
    );

    // Buyers have no farm inventory
    let register_req = json!({
        "name": "Curious Buyer",
        "email": format!("curious{}@example.com", test_id),
        "password": "password123",
        "role": "buyer"
    });

    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(&register_req)
        .to_request();

    let resp = test::call_service(&app, req).await;
    let body: AuthResponse = test::read_body_json(resp).await;

    let req = test::TestRequest::get()
        .uri("/api/farms/my-farms")
        .insert_header(("Authorization", format!("Bearer {}", body.token)))
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn test_update_farm() {
    let app = test::init_service(create_test_app().await).await;

    let test_id = generate_test_id();
    let register_req = json!({
        "name": "Farm Owner",
        "email": format!("update{}@example.com", test_id),
        "password": "password123",
        "role": "farmer"
    });

    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(&register_req)
        .to_request();

    let resp = test::call_service(&app, req).await;
    let body: AuthResponse = test::read_body_json(resp).await;
    let token = body.token;

    let req = test::TestRequest::post()
        .uri("/api/farms")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .insert_header(multipart_content_type())
        .set_payload(multipart_body(&farm_fields(&format!(
            "Old Name {}",
            test_id
        ))))
        .to_request();

    let resp = test::call_service(&app, req).await;
    let body: serde_json::Value = test::read_body_json(resp).await;
    let farm_id = body["farm"]["id"].as_str().unwrap().to_string();

    let new_name = format!("New Name {}", test_id);
    let update_fields = vec![
        ("name", new_name.clone()),
        ("price", "60".to_string()),
    ];

    let req = test::TestRequest::put()
        .uri(&format!("/api/farms/{}", farm_id))
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .insert_header(multipart_content_type())
        .set_payload(multipart_body(&update_fields))
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "Farm updated successfully");
    assert_eq!(body["farm"]["name"], new_name.as_str());
    assert_eq!(body["farm"]["price"], 60.0);

    // A different farmer cannot touch it
    let register_req = json!({
        "name": "Other Farmer",
        "email": format!("other{}@example.com", test_id),
        "password": "password123",
        "role": "farmer"
    });

    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(&register_req)
        .to_request();

    let resp = test::call_service(&app, req).await;
    let body: AuthResponse = test::read_body_json(resp).await;

    let req = test::TestRequest::put()
        .uri(&format!("/api/farms/{}", farm_id))
        .insert_header(("Authorization", format!("Bearer {}", body.token)))
        .insert_header(multipart_content_type())
        .set_payload(multipart_body(&[("name", "Hijacked".to_string())]))
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(
        resp.status(),
        StatusCode::FORBIDDEN,
        "Only the owner may update a farm"
    );
}

#[actix_web::test]
async fn test_delete_farm() {
    let app = test::init_service(create_test_app().await).await;

    let test_id = generate_test_id();
    let register_req = json!({
        "name": "Farm Owner",
        "email": format!("delete{}@example.com", test_id),
        "password": "password123",
        "role": "farmer"
    });

    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(&register_req)
        .to_request();

    let resp = test::call_service(&app, req).await;
    let body: AuthResponse = test::read_body_json(resp).await;
    let token = body.token;

    let req = test::TestRequest::post()
        .uri("/api/farms")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .insert_header(multipart_content_type())
        .set_payload(multipart_body(&farm_fields(&format!(
            "Doomed Farm {}",
            test_id
        ))))
        .to_request();

    let resp = test::call_service(&app, req).await;
    let body: serde_json::Value = test::read_body_json(resp).await;
    let farm_id = body["farm"]["id"].as_str().unwrap().to_string();

    let req = test::TestRequest::delete()
        .uri(&format!("/api/farms/{}", farm_id))
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "Farm deleted successfully");

    // Gone for good
    let req = test::TestRequest::get()
        .uri(&format!("/api/farms/{}", farm_id))
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn test_review_lifecycle_updates_farm_rating() {
    let app = test::init_service(create_test_app().await).await;

    let test_id = generate_test_id();

    // Farmer lists a farm
    let register_req = json!({
        "name": "Rated Farmer",
        "email": format!("rated{}@example.com", test_id),
        "password": "password123",
        "role": "farmer"
    });

    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(&register_req)
        .to_request();

    let resp = test::call_service(&app, req).await;
    let body: AuthResponse = test::read_body_json(resp).await;
    let farmer_token = body.token;

    let req = test::TestRequest::post()
        .uri("/api/farms")
        .insert_header(("Authorization", format!("Bearer {}", farmer_token)))
        .insert_header(multipart_content_type())
        .set_payload(multipart_body(&farm_fields(&format!(
            "Rated Farm {}",
            test_id
        ))))
        .to_request();

    let resp = test::call_service(&app, req).await;
    let body: serde_json::Value = test::read_body_json(resp).await;
    let farm_id = body["farm"]["id"].as_str().unwrap().to_string();

    // First buyer leaves a 5-star review
    let register_req = json!({
        "name": "First Buyer",
        "email": format!("buyer1a{}@example.com", test_id),
        "password": "password123",
        "role": "buyer"
    });

    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(&register_req)
        .to_request();

    let resp = test::call_service(&app, req).await;
    let body: AuthResponse = test::read_body_json(resp).await;
    let buyer1_token = body.token;

    let review_req = json!({
        "farm": farm_id,
        "rating": 5,
        "comment": "Excellent fresh milk, delivered on time every day.",
        "aspects": { "quality": 5, "service": 5 }
    });

    let req = test::TestRequest::post()
        .uri("/api/reviews")
        .insert_header(("Authorization", format!("Bearer {}", buyer1_token)))
        .set_json(&review_req)
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(
        resp.status(),
        StatusCode::CREATED,
        "Create review should return 201 CREATED"
    );

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "Review created successfully");
    assert_eq!(body["review"]["rating"], 5);
    let review_id = body["review"]["id"].as_str().unwrap().to_string();

    let req = test::TestRequest::get()
        .uri(&format!("/api/farms/{}", farm_id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    let farm: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(farm["ratings"]["average"], 5.0);
    assert_eq!(farm["ratings"]["count"], 1);

    // Second buyer rates 3, average drops to 4
    let register_req = json!({
        "name": "Second Buyer",
        "email": format!("buyer2a{}@example.com", test_id),
        "password": "password123",
        "role": "buyer"
    });

    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(&register_req)
        .to_request();

    let resp = test::call_service(&app, req).await;
    let body: AuthResponse = test::read_body_json(resp).await;
    let buyer2_token = body.token;

    let review_req = json!({
        "farm": farm_id,
        "rating": 3,
        "comment": "Milk is fine but deliveries run late sometimes."
    });

    let req = test::TestRequest::post()
        .uri("/api/reviews")
        .insert_header(("Authorization", format!("Bearer {}", buyer2_token)))
        .set_json(&review_req)
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let req = test::TestRequest::get()
        .uri(&format!("/api/farms/{}", farm_id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    let farm: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(farm["ratings"]["average"], 4.0);
    assert_eq!(farm["ratings"]["count"], 2);

    // First buyer revises down to 1, average becomes 2
    let update_req = json!({ "rating": 1 });
    let req = test::TestRequest::put()
        .uri(&format!("/api/reviews/{}", review_id))
        .insert_header(("Authorization", format!("Bearer {}", buyer1_token)))
        .set_json(&update_req)
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "Review updated successfully");
    assert_eq!(body["review"]["rating"], 1);

    let req = test::TestRequest::get()
        .uri(&format!("/api/farms/{}", farm_id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    let farm: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(farm["ratings"]["average"], 2.0);

    // Deleting the revised review leaves only the 3-star one
    let req = test::TestRequest::delete()
        .uri(&format!("/api/reviews/{}", review_id))
        .insert_header(("Authorization", format!("Bearer {}", buyer1_token)))
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let req = test::TestRequest::get()
        .uri(&format!("/api/farms/{}", farm_id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    let farm: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(farm["ratings"]["average"], 3.0);
    assert_eq!(farm["ratings"]["count"], 1);
}

#[actix_web::test]
async fn test_duplicate_review_rejected() {
    let app = test::init_service(create_test_app().await).await;

    let test_id = generate_test_id();
    let register_req = json!({
        "name": "Farmer",
        "email": format!("dupfarm{}@example.com", test_id),
        "password": "password123",
        "role": "farmer"
    });

    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(&register_req)
        .to_request();

    let resp = test::call_service(&app, req).await;
    let body: AuthResponse = test::read_body_json(resp).await;
    let farmer_token = body.token;

    let req = test::TestRequest::post()
        .uri("/api/farms")
        .insert_header(("Authorization", format!("Bearer {}", farmer_token)))
        .insert_header(multipart_content_type())
        .set_payload(multipart_body(&farm_fields(&format!(
            "Dup Review Farm {}",
            test_id
        ))))
        .to_request();

    let resp = test::call_service(&app, req).await;
    let body: serde_json::Value = test::read_body_json(resp).await;
    let farm_id = body["farm"]["id"].as_str().unwrap().to_string();

    let register_req = json!({
        "name": "Repeat Buyer",
        "email": format!("repeat{}@example.com", test_id),
        "password": "password123",
        "role": "buyer"
    });

    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(&register_req)
        .to_request();

    let resp = test::call_service(&app, req).await;
    let body: AuthResponse = test::read_body_json(resp).await;
    let buyer_token = body.token;

    let review_req = json!({
        "farm": farm_id,
        "rating": 4,
        "comment": "Very happy with the morning deliveries."
    });

    let req = test::TestRequest::post()
        .uri("/api/reviews")
        .insert_header(("Authorization", format!("Bearer {}", buyer_token)))
        .set_json(&review_req)
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    // Same buyer, same farm: rejected
    let req = test::TestRequest::post()
        .uri("/api/reviews")
        .insert_header(("Authorization", format!("Bearer {}", buyer_token)))
        .set_json(&review_req)
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "You have already reviewed this farm");
}

#[actix_web::test]
async fn test_review_requires_buyer_role() {
    let app = test::init_service(create_test_app().await).await;

    let test_id = generate_test_id();
    let register_req = json!({
        "name": "Self Reviewer",
        "email": format!("selfrev{}@example.com", test_id),
        "password": "password123",
        "role": "farmer"
    });

    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(&register_req)
        .to_request();

    let resp = test::call_service(&app, req).await;
    let body: AuthResponse = test::read_body_json(resp).await;

    let review_req = json!({
        "farm": ObjectId::new().to_hex(),
        "rating": 5,
        "comment": "Trying to pad my own rating from here."
    });

    let req = test::TestRequest::post()
        .uri("/api/reviews")
        .insert_header(("Authorization", format!("Bearer {}", body.token)))
        .set_json(&review_req)
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn test_farm_reviews_listing() {
    let app = test::init_service(create_test_app().await).await;

    let test_id = generate_test_id();
    let register_req = json!({
        "name": "Listing Farmer",
        "email": format!("listfarm{}@example.com", test_id),
        "password": "password123",
        "role": "farmer"
    });

    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(&register_req)
        .to_request();

    let resp = test::call_service(&app, req).await;
    let body: AuthResponse = test::read_body_json(resp).await;
    let farmer_token = body.token;

    let req = test::TestRequest::post()
        .uri("/api/farms")
        .insert_header(("Authorization", format!("Bearer {}", farmer_token)))
        .insert_header(multipart_content_type())
        .set_payload(multipart_body(&farm_fields(&format!(
            "Reviewed Farm {}",
            test_id
        ))))
        .to_request();

    let resp = test::call_service(&app, req).await;
    let body: serde_json::Value = test::read_body_json(resp).await;
    let farm_id = body["farm"]["id"].as_str().unwrap().to_string();

    let register_req = json!({
        "name": "Listing Buyer",
        "email": format!("listbuy{}@example.com", test_id),
        "password": "password123",
        "role": "buyer"
    });

    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(&register_req)
        .to_request();

    let resp = test::call_service(&app, req).await;
    let body: AuthResponse = test::read_body_json(resp).await;
    let buyer_token = body.token;

    let review_req = json!({
        "farm": farm_id,
        "rating": 4,
        "comment": "Good quality milk with reasonable pricing.",
        "aspects": { "quality": 4, "value": 4 }
    });

    let req = test::TestRequest::post()
        .uri("/api/reviews")
        .insert_header(("Authorization", format!("Bearer {}", buyer_token)))
        .set_json(&review_req)
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    // Listing is public
    let req = test::TestRequest::get()
        .uri(&format!("/api/reviews/farm/{}", farm_id))
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["reviews"].as_array().unwrap().len(), 1);
    assert_eq!(body["reviews"][0]["rating"], 4);
    assert_eq!(body["reviews"][0]["buyer"]["name"], "Listing Buyer");
    assert_eq!(body["statistics"]["totalReviews"], 1);
    assert_eq!(body["statistics"]["averageRating"], 4.0);
    assert_eq!(body["statistics"]["ratingDistribution"]["4"], 1);
    assert_eq!(body["pagination"]["currentPage"], 1);

    // My-reviews mirrors it from the buyer's side
    let req = test::TestRequest::get()
        .uri("/api/reviews/my-reviews")
        .insert_header(("Authorization", format!("Bearer {}", buyer_token)))
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["pagination"]["totalReviews"], 1);
    assert_eq!(body["reviews"][0]["farm"]["id"], farm_id.as_str());
}

#[actix_web::test]
async fn test_mark_review_helpful() {
    let app = test::init_service(create_test_app().await).await;

    let test_id = generate_test_id();
    let register_req = json!({
        "name": "Helpful Farmer",
        "email": format!("helpfarm{}@example.com", test_id),
        "password": "password123",
        "role": "farmer"
    });

    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(&register_req)
        .to_request();

    let resp = test::call_service(&app, req).await;
    let body: AuthResponse = test::read_body_json(resp).await;
    let farmer_token = body.token;

    let req = test::TestRequest::post()
        .uri("/api/farms")
        .insert_header(("Authorization", format!("Bearer {}", farmer_token)))
        .insert_header(multipart_content_type())
        .set_payload(multipart_body(&farm_fields(&format!(
            "Helpful Farm {}",
            test_id
        ))))
        .to_request();

    let resp = test::call_service(&app, req).await;
    let body: serde_json::Value = test::read_body_json(resp).await;
    let farm_id = body["farm"]["id"].as_str().unwrap().to_string();

    let register_req = json!({
        "name": "Helpful Buyer",
        "email": format!("helpbuy{}@example.com", test_id),
        "password": "password123",
        "role": "buyer"
    });

    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(&register_req)
        .to_request();

    let resp = test::call_service(&app, req).await;
    let body: AuthResponse = test::read_body_json(resp).await;
    let buyer_token = body.token;

    let review_req = json!({
        "farm": farm_id,
        "rating": 5,
        "comment": "The best farm in the whole district, honestly."
    });

    let req = test::TestRequest::post()
        .uri("/api/reviews")
        .insert_header(("Authorization", format!("Bearer {}", buyer_token)))
        .set_json(&review_req)
        .to_request();

    let resp = test::call_service(&app, req).await;
    let body: serde_json::Value = test::read_body_json(resp).await;
    let review_id = body["review"]["id"].as_str().unwrap().to_string();

    // The farmer finds it helpful
    let req = test::TestRequest::post()
        .uri(&format!("/api/reviews/{}/helpful", review_id))
        .insert_header(("Authorization", format!("Bearer {}", farmer_token)))
        .set_json(&json!({ "isHelpful": true }))
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "Review marked as helpful");
    assert_eq!(body["helpfulCount"], 1);

    // Changing their mind replaces the vote instead of stacking a second one
    let req = test::TestRequest::post()
        .uri(&format!("/api/reviews/{}/helpful", review_id))
        .insert_header(("Authorization", format!("Bearer {}", farmer_token)))
        .set_json(&json!({ "isHelpful": false }))
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "Review marked as not helpful");
    assert_eq!(body["helpfulCount"], 0);
}

#[actix_web::test]
async fn test_owner_response_to_review() {
    let app = test::init_service(create_test_app().await).await;

    let test_id = generate_test_id();
    let register_req = json!({
        "name": "Responding Farmer",
        "email": format!("respfarm{}@example.com", test_id),
        "password": "password123",
        "role": "farmer"
    });

    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(&register_req)
        .to_request();

    let resp = test::call_service(&app, req).await;
    let body: AuthResponse = test::read_body_json(resp).await;
    let owner_token = body.token;

    let req = test::TestRequest::post()
        .uri("/api/farms")
        .insert_header(("Authorization", format!("Bearer {}", owner_token)))
        .insert_header(multipart_content_type())
        .set_payload(multipart_body(&farm_fields(&format!(
            "Responsive Farm {}",
            test_id
        ))))
        .to_request();

    let resp = test::call_service(&app, req).await;
    let body: serde_json::Value = test::read_body_json(resp).await;
    let farm_id = body["farm"]["id"].as_str().unwrap().to_string();

    let register_req = json!({
        "name": "Vocal Buyer",
        "email": format!("vocal{}@example.com", test_id),
        "password": "password123",
        "role": "buyer"
    });

    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(&register_req)
        .to_request();

    let resp = test::call_service(&app, req).await;
    let body: AuthResponse = test::read_body_json(resp).await;
    let buyer_token = body.token;

    let review_req = json!({
        "farm": farm_id,
        "rating": 2,
        "comment": "Two missed deliveries in one week is too many."
    });

    let req = test::TestRequest::post()
        .uri("/api/reviews")
        .insert_header(("Authorization", format!("Bearer {}", buyer_token)))
        .set_json(&review_req)
        .to_request();

    let resp = test::call_service(&app, req).await;
    let body: serde_json::Value = test::read_body_json(resp).await;
    let review_id = body["review"]["id"].as_str().unwrap().to_string();

    // A different farmer cannot answer for this farm
    let register_req = json!({
        "name": "Bystander Farmer",
        "email": format!("bystander{}@example.com", test_id),
        "password": "password123",
        "role": "farmer"
    });

    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(&register_req)
        .to_request();

    let resp = test::call_service(&app, req).await;
    let body: AuthResponse = test::read_body_json(resp).await;

    let req = test::TestRequest::post()
        .uri(&format!("/api/reviews/{}/response", review_id))
        .insert_header(("Authorization", format!("Bearer {}", body.token)))
        .set_json(&json!({ "text": "Not my farm but let me chime in." }))
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);

    // The owner can
    let req = test::TestRequest::post()
        .uri(&format!("/api/reviews/{}/response", review_id))
        .insert_header(("Authorization", format!("Bearer {}", owner_token)))
        .set_json(&json!({ "text": "Sorry about that, we had a vehicle breakdown." }))
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "Response added successfully");
    assert_eq!(
        body["review"]["response"]["text"],
        "Sorry about that, we had a vehicle breakdown."
    );
    assert_eq!(
        body["review"]["response"]["responder"]["name"],
        "Responding Farmer"
    );
}

#[actix_web::test]
async fn test_wishlist_flow() {
    let app = test::init_service(create_test_app().await).await;

    let test_id = generate_test_id();
    let register_req = json!({
        "name": "Wishlist Farmer",
        "email": format!("wishfarm{}@example.com", test_id),
        "password": "password123",
        "role": "farmer"
    });

    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(&register_req)
        .to_request();

    let resp = test::call_service(&app, req).await;
    let body: AuthResponse = test::read_body_json(resp).await;
    let farmer_token = body.token;

    let req = test::TestRequest::post()
        .uri("/api/farms")
        .insert_header(("Authorization", format!("Bearer {}", farmer_token)))
        .insert_header(multipart_content_type())
        .set_payload(multipart_body(&farm_fields(&format!(
            "Wishlisted Farm {}",
            test_id
        ))))
        .to_request();

    let resp = test::call_service(&app, req).await;
    let body: serde_json::Value = test::read_body_json(resp).await;
    let farm_id = body["farm"]["id"].as_str().unwrap().to_string();

    let register_req = json!({
        "name": "Wishful Buyer",
        "email": format!("wishbuy{}@example.com", test_id),
        "password": "password123",
        "role": "buyer"
    });

    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(&register_req)
        .to_request();

    let resp = test::call_service(&app, req).await;
    let body: AuthResponse = test::read_body_json(resp).await;
    let buyer_token = body.token;

    // Starts empty
    let req = test::TestRequest::get()
        .uri("/api/wishlist")
        .insert_header(("Authorization", format!("Bearer {}", buyer_token)))
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["wishlist"]["totalFarms"], 0);

    // Add the farm
    let add_req = json!({ "farmId": farm_id, "notes": "Ask about weekend delivery" });
    let req = test::TestRequest::post()
        .uri("/api/wishlist")
        .insert_header(("Authorization", format!("Bearer {}", buyer_token)))
        .set_json(&add_req)
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::CREATED);

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "Farm added to wishlist successfully");
    assert_eq!(body["wishlist"]["totalFarms"], 1);
    assert_eq!(
        body["wishlist"]["farms"][0]["notes"],
        "Ask about weekend delivery"
    );

    // Adding it twice is refused
    let req = test::TestRequest::post()
        .uri("/api/wishlist")
        .insert_header(("Authorization", format!("Bearer {}", buyer_token)))
        .set_json(&add_req)
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "Farm is already in your wishlist");

    // Membership check
    let req = test::TestRequest::get()
        .uri(&format!("/api/wishlist/check/{}", farm_id))
        .insert_header(("Authorization", format!("Bearer {}", buyer_token)))
        .to_request();

    let resp = test::call_service(&app, req).await;
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["isInWishlist"], true);

    // Update the note
    let req = test::TestRequest::put()
        .uri(&format!("/api/wishlist/{}/notes", farm_id))
        .insert_header(("Authorization", format!("Bearer {}", buyer_token)))
        .set_json(&json!({ "notes": "Ordered a trial batch" }))
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "Notes updated successfully");

    // Stats see the single fresh entry
    let req = test::TestRequest::get()
        .uri("/api/wishlist/stats")
        .insert_header(("Authorization", format!("Bearer {}", buyer_token)))
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["totalFarms"], 1);
    assert_eq!(body["recentlyAdded"], 1);

    // Remove and re-check
    let req = test::TestRequest::delete()
        .uri(&format!("/api/wishlist/{}", farm_id))
        .insert_header(("Authorization", format!("Bearer {}", buyer_token)))
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "Farm removed from wishlist successfully");

    let req = test::TestRequest::get()
        .uri(&format!("/api/wishlist/check/{}", farm_id))
        .insert_header(("Authorization", format!("Bearer {}", buyer_token)))
        .to_request();

    let resp = test::call_service(&app, req).await;
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["isInWishlist"], false);
}

#[actix_web::test]
async fn test_wishlist_requires_buyer_role() {
    let app = test::init_service(create_test_app().await).await;

    let test_id = generate_test_id();
    let register_req = json!({
        "name": "Farmer Browsing",
        "email": format!("browse{}@example.com", test_id),
        "password": "password123",
        "role": "farmer"
    });

    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(&register_req)
        .to_request();

    let resp = test::call_service(&app, req).await;
    let body: AuthResponse = test::read_body_json(resp).await;

    let req = test::TestRequest::get()
        .uri("/api/wishlist")
        .insert_header(("Authorization", format!("Bearer {}", body.token)))
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn test_update_profile() {
    let app = test::init_service(create_test_app().await).await;

    let test_id = generate_test_id();
    let email = format!("profile{}@example.com", test_id);
    let register_req = json!({
        "name": "Before Rename",
        "email": email,
        "password": "password123",
        "role": "buyer"
    });

    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(&register_req)
        .to_request();

    let resp = test::call_service(&app, req).await;
    let body: AuthResponse = test::read_body_json(resp).await;
    let token = body.token;

    let fields = vec![
        ("name", "After Rename".to_string()),
        ("phone", "9123456780".to_string()),
        (
            "location",
            r#"{"city":"Nashik","state":"Maharashtra"}"#.to_string(),
        ),
    ];

    let req = test::TestRequest::put()
        .uri("/api/users/profile")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .insert_header(multipart_content_type())
        .set_payload(multipart_body(&fields))
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "Profile updated successfully");
    assert_eq!(body["user"]["name"], "After Rename");
    assert_eq!(body["user"]["phone"], "9123456780");
    assert_eq!(body["user"]["location"]["city"], "Nashik");

    // The profile endpoint reflects the change
    let req = test::TestRequest::get()
        .uri("/api/users/profile")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["name"], "After Rename");
    assert_eq!(body["email"], email.as_str());
}

#[actix_web::test]
async fn test_update_preferences() {
    let app = test::init_service(create_test_app().await).await;

    let test_id = generate_test_id();
    let register_req = json!({
        "name": "Pref User",
        "email": format!("prefs{}@example.com", test_id),
        "password": "password123",
        "role": "buyer"
    });

    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(&register_req)
        .to_request();

    let resp = test::call_service(&app, req).await;
    let body: AuthResponse = test::read_body_json(resp).await;
    let token = body.token;

    let req = test::TestRequest::put()
        .uri("/api/users/preferences")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .set_json(&json!({
            "notifications": { "email": false, "push": true }
        }))
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "Preferences updated successfully");
    assert_eq!(body["preferences"]["notifications"]["email"], false);
    assert_eq!(body["preferences"]["notifications"]["push"], true);
    // Untouched group keeps its defaults
    assert_eq!(body["preferences"]["privacy"]["showPhone"], true);
}

#[actix_web::test]
async fn test_user_stats_for_new_buyer() {
    let app = test::init_service(create_test_app().await).await;

    let test_id = generate_test_id();
    let register_req = json!({
        "name": "Stats Buyer",
        "email": format!("stats{}@example.com", test_id),
        "password": "password123",
        "role": "buyer"
    });

    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(&register_req)
        .to_request();

    let resp = test::call_service(&app, req).await;
    let body: AuthResponse = test::read_body_json(resp).await;
    let token = body.token;

    let req = test::TestRequest::get()
        .uri("/api/users/stats")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["accountAge"], 0);
    assert_eq!(body["totalReviews"], 0);
    assert_eq!(body["wishlistItems"], 0);
    assert_eq!(body["isVerified"], false);
}

#[actix_web::test]
async fn test_deactivate_account_blocks_login() {
    let app = test::init_service(create_test_app().await).await;

    let test_id = generate_test_id();
    let email = format!("deact{}@example.com", test_id);
    let register_req = json!({
        "name": "Leaving User",
        "email": email,
        "password": "password123",
        "role": "buyer"
    });

    let req = test::TestRequest::post()
        .uri("/api/auth/register")
        .set_json(&register_req)
        .to_request();

    let resp = test::call_service(&app, req).await;
    let body: AuthResponse = test::read_body_json(resp).await;
    let token = body.token;

    let req = test::TestRequest::post()
        .uri("/api/users/deactivate")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "Account deactivated successfully");

    // The still-valid token no longer works
    let req = test::TestRequest::get()
        .uri("/api/auth/me")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    // And neither does the password
    let login_req = json!({
        "email": email,
        "password": "password123"
    });

    let req = test::TestRequest::post()
        .uri("/api/auth/login")
        .set_json(&login_req)
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn test_unknown_api_route() {
    let app = test::init_service(create_test_app().await).await;

    let req = test::TestRequest::get()
        .uri("/api/definitely-not-a-route")
        .to_request();

    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["message"], "Route not found");
}
