#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::module_inception)]
mod tests {
    use std::time::Duration;

    use anyhow::Result;
    use axum::http::StatusCode;
    use axum_test::multipart::{MultipartForm, Part};
    use axum_test::TestServer;
    use cookie::Cookie;
    use secrecy::SecretString;
    use serde_json::{json, Value};
    use tempfile::{tempdir, TempDir};

    use crate::auth::hash_password;
    use crate::cafe::fixtures::new_cafe;
    use crate::config::AppConfig;
    use crate::db::{connect, migrate, CafeRepository, UserRepository};
    use crate::http::auth::SESSION_COOKIE;
    use crate::http::error::{CAFE_NOT_FOUND, RATE_LIMITED};
    use crate::http::{router, AppState};
    use crate::rate_limit::RateLimitConfig;
    use crate::user::{NewUser, User};
    use crate::validation::MISSING;

    const PASSWORD: &str = "flat-white9";

    struct Harness {
        server: TestServer,
        state: AppState,
        uploads: TempDir,
    }

    async fn harness() -> Result<Harness> {
        harness_with(|_| {}).await
    }

    async fn harness_with(configure: impl FnOnce(&mut AppConfig)) -> Result<Harness> {
        let uploads = tempdir()?;
        let pool = connect("sqlite::memory:").await?;
        migrate(&pool).await?;

        let mut config = AppConfig {
            bind: "127.0.0.1:0".parse()?,
            database_url: String::from("sqlite::memory:"),
            secret_key: None,
            api_key: SecretString::from("test-api-key"),
            upload_dir: uploads.path().to_path_buf(),
            max_upload_bytes: 16 * 1024 * 1024,
            secure_cookies: false,
            session_ttl: Duration::from_secs(60 * 60),
            remember_ttl: Duration::from_secs(30 * 24 * 60 * 60),
            token_ttl: Duration::from_secs(60 * 60),
            search_threshold: 70,
            rate_limits: RateLimitConfig::default(),
        };
        configure(&mut config);
        let state = AppState::new(&config, pool);
        let server = TestServer::new(router(state.clone()))?;
        Ok(Harness {
            server,
            state,
            uploads,
        })
    }

    async fn add_user(state: &AppState, email: &str, admin: bool) -> Result<User> {
        let users = UserRepository::new(&state.pool);
        let mut user = users
            .create(&NewUser {
                username: email.split('@').next().unwrap().to_string(),
                email: email.to_string(),
                password_hash: hash_password(PASSWORD)?,
            })
            .await?;
        if admin {
            users.set_admin(email, true).await?;
            user.is_admin = true;
        }
        Ok(user)
    }

    async fn sign_in(h: &Harness, email: &str) -> Cookie<'static> {
        h.server
            .post("/login")
            .form(&[("email", email), ("password", PASSWORD)])
            .await
            .cookie(SESSION_COOKIE)
    }

    fn cafe_form(name: &str) -> MultipartForm {
        MultipartForm::new()
            .add_text("name", name)
            .add_text("map_url", "https://maps.example.com/grind")
            .add_text("city", "London")
            .add_text("country", "United Kingdom (UK)")
            .add_text("currency", "£")
            .add_text("coffee_price", "2.80")
            .add_text("wifi_strength", "4")
            .add_text("seats", "30")
            .add_text("has_sockets", "True")
            .add_text("has_toilet", "False")
            .add_text("full_review", "Great spot")
            .add_text("full_rating", "5")
    }

    fn cafe_body(name: &str) -> Value {
        json!({
            "name": name,
            "map_url": "https://maps.example.com/grind",
            "city": "London",
            "country": "United Kingdom (UK)",
            "coffee_price": "2.80",
            "currency": "£",
            "wifi_strength": 4,
            "seats": 30,
            "has_sockets": true,
            "has_toilet": false,
            "full_review": "Great spot",
            "full_rating": 5
        })
    }

    #[tokio::test]
    async fn health_reports_cafe_count() -> Result<()> {
        let h = harness().await?;
        CafeRepository::new(&h.state.pool)
            .create(&new_cafe("Grind", "London", "United Kingdom (UK)"))
            .await?;

        let response = h.server.get("/health").await;
        assert_eq!(response.status_code(), StatusCode::OK);
        assert_eq!(response.json::<Value>(), json!({ "status": "ok", "cafes": 1 }));
        Ok(())
    }

    #[tokio::test]
    async fn api_login_issues_tokens() -> Result<()> {
        let h = harness().await?;
        add_user(&h.state, "admin@example.com", true).await?;
        add_user(&h.state, "reader@example.com", false).await?;

        let admin = h
            .server
            .post("/api/login")
            .json(&json!({ "email": "Admin@Example.com", "password": PASSWORD }))
            .await;
        assert_eq!(admin.status_code(), StatusCode::OK);
        let body = admin.json::<Value>();
        assert_eq!(body["message"], "Admin login successful!");
        assert!(body["token"].as_str().is_some_and(|t| !t.is_empty()));

        let reader = h
            .server
            .post("/api/login")
            .json(&json!({ "email": "reader@example.com", "password": PASSWORD }))
            .await;
        assert_eq!(reader.status_code(), StatusCode::OK);
        assert!(reader.json::<Value>().get("message").is_none());
        Ok(())
    }

    #[tokio::test]
    async fn api_login_rejects_bad_requests() -> Result<()> {
        let h = harness().await?;
        add_user(&h.state, "reader@example.com", false).await?;

        let wrong = h
            .server
            .post("/api/login")
            .json(&json!({ "email": "reader@example.com", "password": "nope" }))
            .await;
        assert_eq!(wrong.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(wrong.json::<Value>()["message"], "Invalid email or password.");

        let missing = h
            .server
            .post("/api/login")
            .json(&json!({ "email": "reader@example.com" }))
            .await;
        assert_eq!(missing.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(missing.json::<Value>()["message"], "Invalid credentials!");

        let not_json = h.server.post("/api/login").text("email=x").await;
        assert_eq!(not_json.status_code(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

        let empty = h.server.post("/api/login").json(&json!({})).await;
        assert_eq!(empty.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            empty.json::<Value>()["message"],
            "Request body is empty. Please provide login credentials."
        );
        Ok(())
    }

    #[tokio::test]
    async fn api_login_budget_is_enforced() -> Result<()> {
        let h = harness().await?;
        let attempt = json!({ "email": "ghost@example.com", "password": PASSWORD });

        for _ in 0..RateLimitConfig::default().login_per_minute {
            let response = h.server.post("/api/login").json(&attempt).await;
            assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
        }
        let limited = h.server.post("/api/login").json(&attempt).await;
        assert_eq!(limited.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(limited.json::<Value>()["message"], RATE_LIMITED);
        Ok(())
    }

    #[tokio::test]
    async fn cafe_routes_require_a_valid_token() -> Result<()> {
        let h = harness().await?;
        let user = add_user(&h.state, "reader@example.com", false).await?;

        let missing = h.server.get("/api/cafes").await;
        assert_eq!(missing.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(missing.json::<Value>()["message"], "Token is missing!");

        let malformed = h
            .server
            .get("/api/cafes")
            .add_header("Authorization", "Bearer")
            .await;
        assert_eq!(malformed.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(malformed.json::<Value>()["message"], "Token format is invalid!");

        let garbage = h
            .server
            .get("/api/cafes")
            .authorization_bearer("not-a-token")
            .await;
        assert_eq!(garbage.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(garbage.json::<Value>()["message"], "Token is invalid!");

        let two_hours_ago = chrono::Utc::now().timestamp() - 2 * 60 * 60;
        let expired = h.state.tokens.issue_at(user.id, two_hours_ago)?;
        let expired = h.server.get("/api/cafes").authorization_bearer(expired).await;
        assert_eq!(expired.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            expired.json::<Value>()["message"],
            "Token has expired! Please login again."
        );

        let orphan = h.state.tokens.issue(user.id + 100)?;
        let orphan = h.server.get("/api/cafes").authorization_bearer(orphan).await;
        assert_eq!(orphan.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(orphan.json::<Value>()["message"], "User not found!");

        let valid = h.state.tokens.issue(user.id)?;
        let listed = h.server.get("/api/cafes").authorization_bearer(valid).await;
        assert_eq!(listed.status_code(), StatusCode::OK);
        assert_eq!(listed.json::<Value>(), json!({ "cafes": [] }));
        Ok(())
    }

    #[tokio::test]
    async fn mutations_need_admin_before_lookup() -> Result<()> {
        let h = harness().await?;
        let user = add_user(&h.state, "reader@example.com", false).await?;
        let token = h.state.tokens.issue(user.id)?;

        let update = h
            .server
            .put("/api/cafes/999")
            .authorization_bearer(&token)
            .json(&json!({ "seats": 1 }))
            .await;
        assert_eq!(update.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            update.json::<Value>()["message"],
            "Access forbidden: Admin privileges required!"
        );

        let delete = h
            .server
            .delete("/api/cafes/999")
            .authorization_bearer(&token)
            .await;
        assert_eq!(delete.status_code(), StatusCode::FORBIDDEN);
        Ok(())
    }

    #[tokio::test]
    async fn unknown_cafe_is_not_found() -> Result<()> {
        let h = harness().await?;
        let admin = add_user(&h.state, "admin@example.com", true).await?;
        let token = h.state.tokens.issue(admin.id)?;

        let response = h
            .server
            .get("/api/cafes/42")
            .authorization_bearer(&token)
            .await;
        assert_eq!(response.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.json::<Value>(),
            json!({ "error": { "Not Found": CAFE_NOT_FOUND } })
        );

        let update = h
            .server
            .put("/api/cafes/42")
            .authorization_bearer(&token)
            .json(&json!({ "seats": 1 }))
            .await;
        assert_eq!(update.status_code(), StatusCode::NOT_FOUND);
        Ok(())
    }

    #[tokio::test]
    async fn create_cafe_checks_body_and_duplicates() -> Result<()> {
        let h = harness().await?;
        let user = add_user(&h.state, "reader@example.com", false).await?;
        let token = h.state.tokens.issue(user.id)?;

        let not_json = h
            .server
            .post("/api/cafes")
            .authorization_bearer(&token)
            .text("name=Grind")
            .await;
        assert_eq!(not_json.status_code(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(
            not_json.json::<Value>()["message"],
            "Check request body. Content-Type must be application/json"
        );

        let empty = h
            .server
            .post("/api/cafes")
            .authorization_bearer(&token)
            .json(&json!({}))
            .await;
        assert_eq!(empty.status_code(), StatusCode::BAD_REQUEST);

        let created = h
            .server
            .post("/api/cafes")
            .authorization_bearer(&token)
            .json(&cafe_body("Grind"))
            .await;
        assert_eq!(created.status_code(), StatusCode::CREATED);
        let body = created.json::<Value>();
        assert_eq!(body["message"], "Cafe added successfully!");
        assert_eq!(body["cafe"]["name"], "Grind");
        assert_eq!(body["cafe"]["seats"], 30);

        let duplicate = h
            .server
            .post("/api/cafes")
            .authorization_bearer(&token)
            .json(&cafe_body("Grind"))
            .await;
        assert_eq!(duplicate.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            duplicate.json::<Value>()["message"],
            "Cafe 'Grind' already exists in the database."
        );
        assert_eq!(CafeRepository::new(&h.state.pool).count().await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn create_cafe_reports_field_errors() -> Result<()> {
        let h = harness().await?;
        let user = add_user(&h.state, "reader@example.com", false).await?;
        let token = h.state.tokens.issue(user.id)?;

        let mut body = cafe_body("Grind");
        body.as_object_mut().unwrap().remove("name");
        body["full_rating"] = json!(9);
        body["mood"] = json!("cosy");

        let response = h
            .server
            .post("/api/cafes")
            .authorization_bearer(&token)
            .json(&body)
            .await;
        assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
        let errors = &response.json::<Value>()["errors"];
        assert_eq!(errors["name"][0], MISSING);
        assert!(errors["full_rating"].is_array());
        assert_eq!(errors["mood"][0], "Unknown field.");
        assert_eq!(CafeRepository::new(&h.state.pool).count().await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn admin_updates_and_deletes_cafes() -> Result<()> {
        let h = harness().await?;
        let admin = add_user(&h.state, "admin@example.com", true).await?;
        let token = h.state.tokens.issue(admin.id)?;
        let cafe = CafeRepository::new(&h.state.pool)
            .create(&new_cafe("Grind", "London", "United Kingdom (UK)"))
            .await?;

        let updated = h
            .server
            .put(&format!("/api/cafes/{}", cafe.id))
            .authorization_bearer(&token)
            .json(&json!({ "seats": 50 }))
            .await;
        assert_eq!(updated.status_code(), StatusCode::OK);
        let body = updated.json::<Value>();
        assert_eq!(body["message"], "Grind updated successfully!");

        let mut expected = serde_json::to_value(&cafe)?;
        expected["seats"] = json!(50);
        assert_eq!(body["cafe"], expected);
        let stored = CafeRepository::new(&h.state.pool).get(cafe.id).await?.unwrap();
        assert_eq!(serde_json::to_value(&stored)?, expected);

        let deleted = h
            .server
            .delete(&format!("/api/cafes/{}", cafe.id))
            .authorization_bearer(&token)
            .await;
        assert_eq!(deleted.status_code(), StatusCode::OK);
        assert_eq!(deleted.json::<Value>()["message"], "Grind deleted successfully!");

        let gone = h
            .server
            .get(&format!("/api/cafes/{}", cafe.id))
            .authorization_bearer(&token)
            .await;
        assert_eq!(gone.status_code(), StatusCode::NOT_FOUND);
        Ok(())
    }

    #[tokio::test]
    async fn registration_derives_unique_usernames() -> Result<()> {
        let h = harness().await?;
        for email in ["a@example.com", "A@example.org"] {
            let response = h
                .server
                .post("/register")
                .form(&[
                    ("email", email),
                    ("password", PASSWORD),
                    ("confirm_password", PASSWORD),
                ])
                .await;
            assert_eq!(response.status_code(), StatusCode::SEE_OTHER);
            assert_eq!(response.header("location"), "/login?registered=1");
        }

        let users = UserRepository::new(&h.state.pool);
        let first = users.find_by_email("a@example.com").await?.unwrap();
        let second = users.find_by_email("a@example.org").await?.unwrap();
        assert_eq!(first.username, "a");
        assert_eq!(second.username, "a1");
        assert!(!first.is_admin);

        let again = h
            .server
            .post("/register")
            .form(&[
                ("email", "a@example.com"),
                ("password", PASSWORD),
                ("confirm_password", PASSWORD),
            ])
            .await;
        assert_eq!(again.status_code(), StatusCode::OK);
        assert!(again.text().contains("That email is already in use."));
        Ok(())
    }

    #[tokio::test]
    async fn session_login_opens_protected_pages() -> Result<()> {
        let h = harness().await?;
        add_user(&h.state, "reader@example.com", false).await?;

        let anonymous = h.server.get("/add").await;
        assert_eq!(anonymous.status_code(), StatusCode::SEE_OTHER);
        assert_eq!(anonymous.header("location"), "/login?next=%2Fadd");

        let failed = h
            .server
            .post("/login")
            .form(&[("email", "reader@example.com"), ("password", "wrong-pass1!")])
            .await;
        assert_eq!(failed.status_code(), StatusCode::OK);
        assert!(failed.text().contains("Invalid email or password. Please try again."));

        let login = h
            .server
            .post("/login?next=/add")
            .form(&[
                ("email", "reader@example.com"),
                ("password", PASSWORD),
                ("remember_me", "y"),
            ])
            .await;
        assert_eq!(login.status_code(), StatusCode::SEE_OTHER);
        assert_eq!(login.header("location"), "/add");
        let session = login.cookie(SESSION_COOKIE);
        assert_eq!(
            session.max_age().map(|age| age.whole_seconds()),
            Some(30 * 24 * 60 * 60)
        );

        let form = h.server.get("/add").add_cookie(session.clone()).await;
        assert_eq!(form.status_code(), StatusCode::OK);
        assert!(form.text().contains("Add a cafe"));

        let logout = h.server.get("/logout").add_cookie(session.clone()).await;
        assert_eq!(logout.status_code(), StatusCode::SEE_OTHER);
        assert_eq!(logout.header("location"), "/?logged_out=1");

        let after = h.server.get("/add").add_cookie(session).await;
        assert_eq!(after.status_code(), StatusCode::SEE_OTHER);
        Ok(())
    }

    #[tokio::test]
    async fn login_ignores_offsite_next() -> Result<()> {
        let h = harness().await?;
        add_user(&h.state, "reader@example.com", false).await?;

        let login = h
            .server
            .post("/login")
            .form(&[
                ("email", "reader@example.com"),
                ("password", PASSWORD),
                ("next", "//evil.example.com/"),
            ])
            .await;
        assert_eq!(login.status_code(), StatusCode::SEE_OTHER);
        assert_eq!(login.header("location"), "/");
        assert!(login.cookie(SESSION_COOKIE).max_age().is_none());
        Ok(())
    }

    #[tokio::test]
    async fn admin_pages_refuse_regular_users() -> Result<()> {
        let h = harness().await?;
        add_user(&h.state, "reader@example.com", false).await?;
        let cafe = CafeRepository::new(&h.state.pool)
            .create(&new_cafe("Grind", "London", "United Kingdom (UK)"))
            .await?;

        let login = h
            .server
            .post("/login")
            .form(&[("email", "reader@example.com"), ("password", PASSWORD)])
            .await;
        let session = login.cookie(SESSION_COOKIE);

        let response = h
            .server
            .post(&format!("/delete_cafe/{}", cafe.id))
            .add_cookie(session)
            .await;
        assert_eq!(response.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            response.json::<Value>()["message"],
            "Access denied! Admin privileges required."
        );
        assert_eq!(CafeRepository::new(&h.state.pool).count().await?, 1);
        Ok(())
    }

    #[tokio::test]
    async fn admin_page_deletes_and_reports_missing() -> Result<()> {
        let h = harness().await?;
        add_user(&h.state, "admin@example.com", true).await?;
        let cafe = CafeRepository::new(&h.state.pool)
            .create(&new_cafe("Grind", "London", "United Kingdom (UK)"))
            .await?;

        let login = h
            .server
            .post("/login")
            .form(&[("email", "admin@example.com"), ("password", PASSWORD)])
            .await;
        let session = login.cookie(SESSION_COOKIE);

        let deleted = h
            .server
            .post(&format!("/delete_cafe/{}", cafe.id))
            .add_cookie(session.clone())
            .await;
        assert_eq!(deleted.header("location"), "/feedback?action=delete");

        let missing = h
            .server
            .get(&format!("/update/{}", cafe.id))
            .add_cookie(session)
            .await;
        assert_eq!(missing.header("location"), "/feedback?action=notfound");
        Ok(())
    }

    #[tokio::test]
    async fn search_page_tolerates_typos() -> Result<()> {
        let h = harness().await?;
        let cafes = CafeRepository::new(&h.state.pool);
        cafes
            .create(&new_cafe("Grind", "London", "United Kingdom (UK)"))
            .await?;
        cafes
            .create(&new_cafe("Blue Bottle", "Oakland", "United States (US)"))
            .await?;

        let found = h.server.get("/search").add_query_param("query", "Lodnon").await;
        assert_eq!(found.status_code(), StatusCode::OK);
        let text = found.text();
        assert!(text.contains("Grind"));
        assert!(!text.contains("Blue Bottle"));

        let none = h.server.get("/search").add_query_param("query", "zzzzzz").await;
        assert!(none
            .text()
            .contains("Sorry, no cafes matching your search criteria were found."));

        let blank = h.server.get("/search").await;
        assert!(blank.text().contains("Please enter a search query."));
        Ok(())
    }

    #[tokio::test]
    async fn top_rated_listing_keeps_five_star_cafes() -> Result<()> {
        let h = harness().await?;
        let cafes = CafeRepository::new(&h.state.pool);
        let mut best = new_cafe("Grind", "London", "United Kingdom (UK)");
        best.full_rating = 5;
        cafes.create(&best).await?;
        cafes
            .create(&new_cafe("Average Joe", "Leeds", "United Kingdom (UK)"))
            .await?;

        let all = h.server.get("/all").await.text();
        assert!(all.contains("Grind") && all.contains("Average Joe"));

        let rated = h.server.get("/all").add_query_param("is_rated", "1").await.text();
        assert!(rated.contains("Grind"));
        assert!(!rated.contains("Average Joe"));
        Ok(())
    }

    #[tokio::test]
    async fn add_form_stores_uploaded_images() -> Result<()> {
        let h = harness().await?;
        add_user(&h.state, "reader@example.com", false).await?;
        let login = h
            .server
            .post("/login")
            .form(&[("email", "reader@example.com"), ("password", PASSWORD)])
            .await;
        let session = login.cookie(SESSION_COOKIE);

        let png = vec![0x89, b'P', b'N', b'G', 1, 2, 3];
        let form = MultipartForm::new()
            .add_text("name", "Grind")
            .add_text("map_url", "https://maps.example.com/grind")
            .add_text("city", "London")
            .add_text("country", "United Kingdom (UK)")
            .add_text("currency", "£")
            .add_text("coffee_price", "2.80")
            .add_text("wifi_strength", "4")
            .add_text("seats", "30")
            .add_text("has_sockets", "True")
            .add_text("has_toilet", "False")
            .add_text("full_review", "Great spot")
            .add_text("full_rating", "5")
            .add_part(
                "images",
                Part::bytes(png.clone())
                    .file_name("front.png")
                    .mime_type("image/png"),
            )
            .add_part(
                "images",
                Part::bytes(b"not an image".to_vec())
                    .file_name("notes.txt")
                    .mime_type("text/plain"),
            );

        let response = h
            .server
            .post("/add")
            .add_cookie(session)
            .multipart(form)
            .await;
        assert_eq!(response.status_code(), StatusCode::SEE_OTHER);
        assert_eq!(response.header("location"), "/feedback?action=add");

        let stored = CafeRepository::new(&h.state.pool)
            .find_by_name("Grind")
            .await?
            .unwrap();
        assert!(stored.has_sockets);
        assert_eq!(stored.seats, 30);
        let paths = stored.image_paths();
        assert_eq!(paths.len(), 1);
        assert!(paths[0].starts_with("uploads/") && paths[0].ends_with("_front.png"));

        let file_name = paths[0].trim_start_matches("uploads/");
        assert!(h.uploads.path().join(file_name).exists());
        let served = h.server.get(&format!("/{}", paths[0])).await;
        assert_eq!(served.status_code(), StatusCode::OK);
        assert_eq!(served.as_bytes().to_vec(), png);
        Ok(())
    }

    #[tokio::test]
    async fn add_form_rerenders_on_errors() -> Result<()> {
        let h = harness().await?;
        add_user(&h.state, "reader@example.com", false).await?;
        let login = h
            .server
            .post("/login")
            .form(&[("email", "reader@example.com"), ("password", PASSWORD)])
            .await;
        let session = login.cookie(SESSION_COOKIE);

        let form = MultipartForm::new()
            .add_text("name", "Grind")
            .add_text("map_url", "not a url");
        let response = h
            .server
            .post("/add")
            .add_cookie(session)
            .multipart(form)
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);
        let text = response.text();
        assert!(text.contains("Map URL - Not a valid URL."));
        assert!(text.contains("City - Missing data for required field."));
        assert_eq!(CafeRepository::new(&h.state.pool).count().await?, 0);
        Ok(())
    }

    #[tokio::test]
    async fn forwarded_headers_do_not_split_the_login_budget() -> Result<()> {
        let h = harness().await?;
        let attempt = json!({ "email": "ghost@example.com", "password": PASSWORD });
        let budget = RateLimitConfig::default().login_per_minute;

        let mut statuses = Vec::new();
        for i in 0..=budget {
            let response = h
                .server
                .post("/api/login")
                .add_header("x-forwarded-for", format!("10.9.9.{i}"))
                .json(&attempt)
                .await;
            statuses.push(response.status_code());
        }
        assert!(statuses[..budget as usize]
            .iter()
            .all(|status| *status == StatusCode::UNAUTHORIZED));
        assert_eq!(statuses[budget as usize], StatusCode::TOO_MANY_REQUESTS);
        Ok(())
    }

    #[tokio::test]
    async fn trusted_proxy_headers_key_the_budget() -> Result<()> {
        let h = harness_with(|config| config.rate_limits.trust_proxy_headers = true).await?;
        let attempt = json!({ "email": "ghost@example.com", "password": PASSWORD });

        for _ in 0..RateLimitConfig::default().login_per_minute {
            h.server
                .post("/api/login")
                .add_header("x-forwarded-for", "10.9.9.1")
                .json(&attempt)
                .await;
        }
        let limited = h
            .server
            .post("/api/login")
            .add_header("x-forwarded-for", "10.9.9.1")
            .json(&attempt)
            .await;
        assert_eq!(limited.status_code(), StatusCode::TOO_MANY_REQUESTS);

        let other = h
            .server
            .post("/api/login")
            .add_header("x-forwarded-for", "10.9.9.2")
            .json(&attempt)
            .await;
        assert_eq!(other.status_code(), StatusCode::UNAUTHORIZED);
        Ok(())
    }

    #[tokio::test]
    async fn admin_login_resets_the_login_budget() -> Result<()> {
        let h = harness().await?;
        add_user(&h.state, "admin@example.com", true).await?;
        let budget = RateLimitConfig::default().login_per_minute;
        let wrong = json!({ "email": "ghost@example.com", "password": PASSWORD });

        for _ in 1..budget {
            h.server.post("/api/login").json(&wrong).await;
        }
        let admin = h
            .server
            .post("/api/login")
            .json(&json!({ "email": "admin@example.com", "password": PASSWORD }))
            .await;
        assert_eq!(admin.status_code(), StatusCode::OK);

        for _ in 0..budget {
            let response = h.server.post("/api/login").json(&wrong).await;
            assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
        }
        let limited = h.server.post("/api/login").json(&wrong).await;
        assert_eq!(limited.status_code(), StatusCode::TOO_MANY_REQUESTS);
        Ok(())
    }

    #[tokio::test]
    async fn only_admin_creates_skip_the_write_budget() -> Result<()> {
        let h = harness().await?;
        let admin = add_user(&h.state, "admin@example.com", true).await?;
        let reader = add_user(&h.state, "reader@example.com", false).await?;
        let admin_token = h.state.tokens.issue(admin.id)?;
        let reader_token = h.state.tokens.issue(reader.id)?;
        let budget = RateLimitConfig::default().write_per_minute;

        for i in 0..budget + 2 {
            let response = h
                .server
                .post("/api/cafes")
                .authorization_bearer(&admin_token)
                .json(&cafe_body(&format!("Admin Cafe {i}")))
                .await;
            assert_eq!(response.status_code(), StatusCode::CREATED);
        }

        for i in 0..budget {
            let response = h
                .server
                .post("/api/cafes")
                .authorization_bearer(&reader_token)
                .json(&cafe_body(&format!("Reader Cafe {i}")))
                .await;
            assert_eq!(response.status_code(), StatusCode::CREATED);
        }
        let limited = h
            .server
            .post("/api/cafes")
            .authorization_bearer(&reader_token)
            .json(&cafe_body("Reader Cafe extra"))
            .await;
        assert_eq!(limited.status_code(), StatusCode::TOO_MANY_REQUESTS);
        Ok(())
    }

    #[tokio::test]
    async fn api_rename_onto_existing_name_conflicts() -> Result<()> {
        let h = harness().await?;
        let admin = add_user(&h.state, "admin@example.com", true).await?;
        let token = h.state.tokens.issue(admin.id)?;
        let cafes = CafeRepository::new(&h.state.pool);
        cafes
            .create(&new_cafe("Grind", "London", "United Kingdom (UK)"))
            .await?;
        let other = cafes
            .create(&new_cafe("Ozone", "London", "United Kingdom (UK)"))
            .await?;

        let response = h
            .server
            .put(&format!("/api/cafes/{}", other.id))
            .authorization_bearer(&token)
            .json(&json!({ "name": "Grind", "seats": 5 }))
            .await;
        assert_eq!(response.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            response.json::<Value>()["message"],
            "Cafe 'Grind' already exists in the database."
        );
        assert_eq!(cafes.get(other.id).await?, Some(other));
        Ok(())
    }

    #[tokio::test]
    async fn update_page_overlays_supplied_fields_and_keeps_images() -> Result<()> {
        let h = harness().await?;
        add_user(&h.state, "admin@example.com", true).await?;
        let mut listed = new_cafe("Grind", "London", "United Kingdom (UK)");
        listed.images = Some(String::from("uploads/front.png"));
        let cafe = CafeRepository::new(&h.state.pool).create(&listed).await?;
        let session = sign_in(&h, "admin@example.com").await;

        let form = MultipartForm::new()
            .add_text("seats", "45")
            .add_part(
                "images",
                Part::bytes(Vec::new())
                    .file_name("")
                    .mime_type("application/octet-stream"),
            );
        let response = h
            .server
            .post(&format!("/update/{}", cafe.id))
            .add_cookie(session)
            .multipart(form)
            .await;
        assert_eq!(response.status_code(), StatusCode::SEE_OTHER);
        assert_eq!(response.header("location"), "/feedback?action=update");

        let stored = CafeRepository::new(&h.state.pool).get(cafe.id).await?.unwrap();
        let mut expected = cafe.clone();
        expected.seats = 45;
        assert_eq!(stored, expected);
        Ok(())
    }

    #[tokio::test]
    async fn update_page_conflict_discards_new_uploads() -> Result<()> {
        let h = harness().await?;
        add_user(&h.state, "admin@example.com", true).await?;
        let cafes = CafeRepository::new(&h.state.pool);
        cafes
            .create(&new_cafe("Grind", "London", "United Kingdom (UK)"))
            .await?;
        let other = cafes
            .create(&new_cafe("Ozone", "London", "United Kingdom (UK)"))
            .await?;
        let session = sign_in(&h, "admin@example.com").await;

        let form = MultipartForm::new().add_text("name", "Grind").add_part(
            "images",
            Part::bytes(vec![1, 2, 3])
                .file_name("new.png")
                .mime_type("image/png"),
        );
        let response = h
            .server
            .post(&format!("/update/{}", other.id))
            .add_cookie(session)
            .multipart(form)
            .await;
        assert_eq!(response.status_code(), StatusCode::OK);
        assert!(response.text().contains("already exists."));

        assert_eq!(std::fs::read_dir(h.uploads.path())?.count(), 0);
        assert_eq!(cafes.get(other.id).await?, Some(other));
        Ok(())
    }

    #[tokio::test]
    async fn add_form_accepts_photos_over_two_megabytes() -> Result<()> {
        let h = harness().await?;
        add_user(&h.state, "reader@example.com", false).await?;
        let session = sign_in(&h, "reader@example.com").await;

        let photo = vec![0xFF; 3 * 1024 * 1024];
        let form = cafe_form("Grind").add_part(
            "images",
            Part::bytes(photo)
                .file_name("photo.jpg")
                .mime_type("image/jpeg"),
        );
        let response = h
            .server
            .post("/add")
            .add_cookie(session)
            .multipart(form)
            .await;
        assert_eq!(response.status_code(), StatusCode::SEE_OTHER);
        assert_eq!(response.header("location"), "/feedback?action=add");

        let stored = CafeRepository::new(&h.state.pool)
            .find_by_name("Grind")
            .await?
            .unwrap();
        assert_eq!(stored.image_paths().len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn add_form_over_the_upload_limit_is_rejected() -> Result<()> {
        let h = harness_with(|config| config.max_upload_bytes = 64 * 1024).await?;
        add_user(&h.state, "reader@example.com", false).await?;
        let session = sign_in(&h, "reader@example.com").await;

        let form = cafe_form("Grind").add_part(
            "images",
            Part::bytes(vec![0xFF; 256 * 1024])
                .file_name("photo.jpg")
                .mime_type("image/jpeg"),
        );
        let response = h
            .server
            .post("/add")
            .add_cookie(session)
            .multipart(form)
            .await;
        assert_eq!(response.status_code(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(response.json::<Value>()["message"], "Upload is too large.");
        assert_eq!(CafeRepository::new(&h.state.pool).count().await?, 0);
        Ok(())
    }
}
