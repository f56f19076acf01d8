use axum::http::StatusCode;
use serde_json::{Value, json};
use tower::ServiceExt;

use super::test_utils::*;

#[tokio::test]
async fn index_reports_running() {
    let (app, _) = setup_app().await;
    let response = app.oneshot(test_request("GET", "/", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = parse_json_response(response).await;
    assert_eq!(body["message"], "Movie Review App API");
}

#[tokio::test]
async fn login_returns_user_and_token() {
    let (app, _) = setup_app().await;
    register_user(&app, "Ana").await;

    let response = app
        .clone()
        .oneshot(test_request_json(
            "POST",
            "/api/auth/login",
            None,
            &json!({ "email": "ana@example.com", "password": "correct horse" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = parse_json_response(response).await;
    assert_eq!(body["user"]["name"], "Ana");
    assert_eq!(body["user"]["isAdmin"], false);
    assert!(body["token"].as_str().is_some_and(|t| !t.is_empty()));

    let response = app
        .oneshot(test_request_json(
            "POST",
            "/api/auth/login",
            None,
            &json!({ "email": "ana@example.com", "password": "wrong" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn protected_routes_require_a_valid_token() {
    let (app, _) = setup_app().await;

    let response = app.clone().oneshot(test_request("GET", "/api/users/lists", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(test_request("GET", "/api/users/lists", Some("not-a-jwt")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: Value = parse_json_response(response).await;
    assert_eq!(body["message"], "Not authorized, token failed");

    let response = app
        .oneshot(test_request_json("POST", "/api/movies/42/reviews", None, &json!({ "rating": 4 })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn review_lifecycle_over_http() {
    let (app, _) = setup_app().await;
    let (u_token, _) = register_user(&app, "U").await;
    let (v_token, _) = register_user(&app, "V").await;

    let response = app
        .clone()
        .oneshot(test_request_json(
            "POST",
            "/api/movies/42/reviews",
            Some(&u_token),
            &json!({ "rating": 4, "reviewText": "Great", "movieTitle": "Inception" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body: Value = parse_json_response(response).await;
    assert_eq!(body["message"], "Review submitted successfully.");
    let u_review_id = body["review"]["id"].as_i64().unwrap();

    let response = app
        .clone()
        .oneshot(test_request_json(
            "POST",
            "/api/movies/42/reviews",
            Some(&v_token),
            &json!({ "rating": 2 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let body: Value = parse_json_response(response).await;
    let v_review_id = body["review"]["id"].as_i64().unwrap();

    let response = app
        .clone()
        .oneshot(test_request_json(
            "POST",
            "/api/movies/42/reviews",
            Some(&u_token),
            &json!({ "rating": 5, "reviewText": "Even better" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = parse_json_response(response).await;
    assert_eq!(body["message"], "Review updated successfully.");
    assert_eq!(body["review"]["id"].as_i64(), Some(u_review_id));

    let response = app.clone().oneshot(test_request("GET", "/api/movies/42/reviews", None)).await.unwrap();
    let body: Value = parse_json_response(response).await;
    assert_eq!(body["averageRating"], 3.5);
    assert_eq!(body["numberOfReviews"], 2);
    assert_eq!(body["reviews"].as_array().unwrap().len(), 2);

    // Not the owner.
    let response = app
        .clone()
        .oneshot(test_request_json(
            "PUT",
            &format!("/api/movies/reviews/{u_review_id}"),
            Some(&v_token),
            &json!({ "rating": 0 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = app
        .clone()
        .oneshot(test_request("DELETE", &format!("/api/movies/reviews/{v_review_id}"), Some(&v_token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.clone().oneshot(test_request("GET", "/api/movies/reviewed", None)).await.unwrap();
    let body: Value = parse_json_response(response).await;
    assert_eq!(body[0]["tmdbId"], "42");
    assert_eq!(body[0]["title"], "Inception");
    assert_eq!(body[0]["averageRating"], 5.0);
    assert_eq!(body[0]["numberOfReviews"], 1);

    let response = app
        .clone()
        .oneshot(test_request("DELETE", &format!("/api/movies/reviews/{u_review_id}"), Some(&u_token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app.clone().oneshot(test_request("GET", "/api/movies/42/reviews", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = parse_json_response(response).await;
    assert_eq!(body["numberOfReviews"], 0);
    assert_eq!(body["averageRating"], 0.0);

    let response = app.oneshot(test_request("GET", "/api/movies/reviewed", None)).await.unwrap();
    let body: Value = parse_json_response(response).await;
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn invalid_review_input_is_a_client_error() {
    let (app, _) = setup_app().await;
    let (token, _) = register_user(&app, "U").await;

    for body in [
        json!({ "movieTitle": "Inception" }),
        json!({ "rating": 6, "movieTitle": "Inception" }),
        json!({ "rating": 3 }),
    ] {
        let response = app
            .clone()
            .oneshot(test_request_json("POST", "/api/movies/42/reviews", Some(&token), &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {body}");
    }

    let response = app
        .oneshot(test_request("DELETE", "/api/movies/reviews/9999", Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn list_membership_over_http() {
    let (app, _) = setup_app().await;
    let (token, _) = register_user(&app, "U").await;

    let response = app
        .clone()
        .oneshot(test_request_json("POST", "/api/users/lists/watchlist", Some(&token), &json!({ "tmdbId": 99 })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = parse_json_response(response).await;
    assert_eq!(body["message"], "Movie added to watchlist list.");
    assert_eq!(body["watchlistMovies"][0]["id"], 99);
    assert_eq!(body["watchedMovies"], json!([]));

    let response = app
        .clone()
        .oneshot(test_request_json("POST", "/api/users/lists/watched", Some(&token), &json!({ "tmdbId": 99 })))
        .await
        .unwrap();
    let body: Value = parse_json_response(response).await;
    assert_eq!(body["watchedMovies"][0]["id"], 99);
    assert_eq!(body["watchlistMovies"], json!([]));

    let response = app
        .clone()
        .oneshot(test_request_json("POST", "/api/users/lists/watched", Some(&token), &json!({ "tmdbId": 99 })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let response = app
        .clone()
        .oneshot(test_request("DELETE", "/api/users/lists/watchlist/99", Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .clone()
        .oneshot(test_request("GET", "/api/users/lists", Some(&token)))
        .await
        .unwrap();
    let body: Value = parse_json_response(response).await;
    assert_eq!(body["watchedMovies"].as_array().unwrap().len(), 1);
    assert!(body.get("message").is_none());

    let response = app
        .clone()
        .oneshot(test_request("DELETE", "/api/users/lists/watched/99", Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = parse_json_response(response).await;
    assert_eq!(body["message"], "Movie removed from watched list.");
    assert_eq!(body["watchedMovies"], json!([]));
}

#[tokio::test]
async fn malformed_list_requests_are_rejected() {
    let (app, _) = setup_app().await;
    let (token, _) = register_user(&app, "U").await;

    let cases = [
        ("/api/users/lists/favorites", json!({ "tmdbId": 1 })),
        ("/api/users/lists/watched", json!({ "tmdbId": "1" })),
        ("/api/users/lists/watched", json!({ "tmdbId": 1.5 })),
        ("/api/users/lists/watched", json!({})),
    ];
    for (uri, body) in cases {
        let response = app
            .clone()
            .oneshot(test_request_json("POST", uri, Some(&token), &body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri} {body}");
    }

    let response = app
        .oneshot(test_request("DELETE", "/api/users/lists/watched/abc", Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn own_reviews_are_paginated() {
    let (app, _) = setup_app().await;
    let (token, _) = register_user(&app, "U").await;

    for id in 1..=3 {
        let response = app
            .clone()
            .oneshot(test_request_json(
                "POST",
                &format!("/api/movies/{id}/reviews"),
                Some(&token),
                &json!({ "rating": id, "movieTitle": format!("Movie {id}") }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    let response = app
        .oneshot(test_request(
            "GET",
            "/api/users/me/reviews?page=1&limit=2&sortBy=rating&order=desc",
            Some(&token),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = parse_json_response(response).await;
    assert_eq!(body["totalReviews"], 3);
    assert_eq!(body["totalPages"], 2);
    assert_eq!(body["reviews"][0]["rating"], 3.0);
    assert_eq!(body["reviews"][0]["movieTitle"], "Movie 3");
}

#[tokio::test]
async fn catalog_proxy_validates_and_forwards() {
    let (app, _) = setup_app().await;

    let response = app.clone().oneshot(test_request("GET", "/api/movies/search", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(test_request("GET", "/api/movies/search?query=fight", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = parse_json_response(response).await;
    assert!(body["results"].is_array());

    for uri in ["/api/movies/tmdb/popular?sortBy=vote_average.desc", "/api/movies/tmdb/now_playing", "/api/movies/tmdb/550"] {
        let response = app.clone().oneshot(test_request("GET", uri, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{uri}");
    }

    let response = app.oneshot(test_request("GET", "/api/movies/tmdb/not-an-id", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_requests_get_json_errors() {
    let (app, _) = setup_app().await;
    let (token, _) = register_user(&app, "U").await;

    let requests = [
        test_request_json(
            "POST",
            "/api/movies/42/reviews",
            Some(&token),
            &json!({ "rating": "4", "movieTitle": "Inception" }),
        ),
        test_request("POST", "/api/movies/42/reviews", Some(&token)),
        test_request_json("PUT", "/api/movies/reviews/abc", Some(&token), &json!({ "rating": 3 })),
        test_request("DELETE", "/api/movies/reviews/abc", Some(&token)),
    ];
    for request in requests {
        let uri = request.uri().to_string();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{uri}");
        let body: Value = parse_json_response(response).await;
        assert!(body["message"].as_str().is_some_and(|m| !m.is_empty()), "{uri}: {body}");
    }
}

#[tokio::test]
async fn own_reviews_paging_tolerates_bad_numbers() {
    let (app, _) = setup_app().await;
    let (token, _) = register_user(&app, "U").await;
    let response = app
        .clone()
        .oneshot(test_request_json(
            "POST",
            "/api/movies/42/reviews",
            Some(&token),
            &json!({ "rating": 4, "movieTitle": "Inception" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .clone()
        .oneshot(test_request("GET", "/api/users/me/reviews?page=abc&limit=xyz", Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = parse_json_response(response).await;
    assert_eq!(body["page"], 1);
    assert_eq!(body["limit"], 6);
    assert_eq!(body["reviews"].as_array().unwrap().len(), 1);

    let response = app
        .clone()
        .oneshot(test_request(
            "GET",
            "/api/users/me/reviews?page=2305843009213693952&limit=6",
            Some(&token),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = parse_json_response(response).await;
    assert_eq!(body["message"], "Page is out of range.");

    let response = app
        .oneshot(test_request("GET", "/api/users/me/reviews", Some(&token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn integral_float_list_ids_are_accepted() {
    let (app, _) = setup_app().await;
    let (token, _) = register_user(&app, "U").await;

    let response = app
        .oneshot(test_request_json("POST", "/api/users/lists/watchlist", Some(&token), &json!({ "tmdbId": 99.0 })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = parse_json_response(response).await;
    assert_eq!(body["watchlistMovies"][0]["id"], 99);
}
