mod support;

use std::sync::Arc;

use market_client::data::{
    AccountService, ArticleService, MarketAccountService, MarketArticleService,
    MarketProductService, ProductService,
};
use market_client::likes::LikeToggle;
use market_client::model::{
    ArticleDraft, LikeState, ListQuery, Login, PasswordChange, ProductDraft, Registration,
};
use market_client::session::Manager;
use market_client::{ApiError, Client, ClientConfig};
use serde_json::{json, Value};
use support::{MockServer, Recorded, Reply};

fn client(server: &MockServer) -> Arc<Client> {
    Arc::new(
        Client::new(ClientConfig {
            base_url: Some(server.url().to_string()),
            user_agent: "market-tests".into(),
            ..ClientConfig::default()
        })
        .unwrap(),
    )
}

fn article(id: i64, title: &str) -> Value {
    json!({
        "id": id,
        "title": title,
        "content": "oak, lightly used",
        "createdAt": "2024-05-01T09:00:00Z",
        "updatedAt": "2024-05-01T09:00:00Z",
        "userId": 2,
        "user": { "id": 2, "nickname": "neighbor" },
        "likeCount": 1,
        "isLiked": false
    })
}

fn product(id: i64, name: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "description": "works fine",
        "price": 15000,
        "tags": ["home"],
        "createdAt": "2024-05-01T09:00:00Z",
        "updatedAt": "2024-05-01T09:00:00Z",
        "likeCount": 7,
        "isLiked": false
    })
}

fn json_body(req: &Recorded) -> Value {
    serde_json::from_slice(&req.body).unwrap()
}

#[test]
fn article_crud_unwraps_data_envelopes() {
    let server = MockServer::start(|req| match (req.method.as_str(), req.path()) {
        ("GET", "/articles") => Reply::json(
            200,
            json!({
                "data": [article(4, "Desk"), article(3, "Chair")],
                "meta": { "page": 1, "pageSize": 10, "total": 2, "totalPages": 1, "hasNextPage": false }
            }),
        ),
        ("GET", "/articles/4") => Reply::json(200, article(4, "Desk")),
        ("POST", "/articles") => Reply::json(201, json!({ "data": article(5, "Lamp") })),
        ("PATCH", "/articles/5") => Reply::json(200, json!({ "data": article(5, "Lamp, again") })),
        ("DELETE", "/articles/5") => Reply::empty(204),
        _ => Reply::empty(404),
    });
    let articles = MarketArticleService::new(client(&server));

    let page = articles
        .list_articles(ListQuery::default().with_keyword("desk"))
        .unwrap();
    assert_eq!(page.data.len(), 2);
    assert_eq!(page.meta.total, 2);

    let detail = articles.article(4).unwrap();
    assert_eq!(detail.author_name(), "neighbor");

    let draft = ArticleDraft {
        title: "Lamp".into(),
        content: "brass".into(),
    };
    assert_eq!(articles.create_article(&draft).unwrap().id, 5);
    assert_eq!(
        articles.update_article(5, &draft).unwrap().title,
        "Lamp, again"
    );
    articles.delete_article(5).unwrap();

    let requests = server.requests();
    assert_eq!(requests[0].query(), Some("page=1&pageSize=10&keyword=desk"));
    assert_eq!(
        json_body(&requests[2]),
        json!({ "title": "Lamp", "content": "brass" })
    );
    assert_eq!(requests[3].method, "PATCH");
    assert_eq!(requests[4].method, "DELETE");
}

#[test]
fn like_toggle_adopts_server_counts() {
    let server = MockServer::start(|req| match (req.method.as_str(), req.path()) {
        ("POST", "/products/3/like") => {
            Reply::json(200, json!({ "isLiked": true, "likeCount": 8 }))
        }
        ("POST", "/articles/4/like") => {
            Reply::json(200, json!({ "data": { "isLiked": false, "likeCount": 0 } }))
        }
        _ => Reply::empty(404),
    });
    let client = client(&server);
    let products = MarketProductService::new(client.clone());
    let articles = MarketArticleService::new(client);

    let toggle = LikeToggle::new(LikeState {
        is_liked: false,
        like_count: 7,
    });
    let state = toggle.toggle(|| products.toggle_product_like(3)).unwrap();
    let expected = LikeState {
        is_liked: true,
        like_count: 8,
    };
    assert_eq!(state, Some(expected));
    assert_eq!(toggle.state(), expected);

    let mut desk: market_client::model::Article =
        serde_json::from_value(article(4, "Desk")).unwrap();
    desk.apply_like(articles.toggle_article_like(4).unwrap());
    assert!(!desk.is_liked);
    assert_eq!(desk.like_count, 0);

    assert_eq!(server.hits("POST", "/products/3/like"), 1);
    assert_eq!(server.hits("POST", "/articles/4/like"), 1);
}

#[test]
fn product_create_sends_camel_case_draft() {
    let server = MockServer::start(|req| match (req.method.as_str(), req.path()) {
        ("POST", "/products") => Reply::json(201, json!({ "data": product(9, "Lamp") })),
        ("GET", "/products/9") => Reply::json(200, product(9, "Lamp")),
        ("PATCH", "/products/9") => Reply::json(200, json!({ "data": product(9, "Brass lamp") })),
        ("DELETE", "/products/9") => Reply::empty(204),
        _ => Reply::empty(404),
    });
    let products = MarketProductService::new(client(&server));

    let draft = ProductDraft {
        name: "Lamp".into(),
        description: "works fine".into(),
        price: 15000,
        tags: vec!["home".into()],
        image_urls: vec!["http://cdn.local/a.png".into()],
    };
    let created = products.create_product(&draft).unwrap();
    assert_eq!(created.id, 9);
    assert_eq!(created.price, 15000);
    assert_eq!(products.product(9).unwrap().tags, vec!["home"]);
    assert_eq!(products.update_product(9, &draft).unwrap().name, "Brass lamp");
    products.delete_product(9).unwrap();

    let requests = server.requests();
    assert_eq!(
        json_body(&requests[0]),
        json!({
            "name": "Lamp",
            "description": "works fine",
            "price": 15000,
            "tags": ["home"],
            "imageUrls": ["http://cdn.local/a.png"]
        })
    );
    assert_eq!(server.hits("DELETE", "/products/9"), 1);
}

#[test]
fn account_endpoints_use_expected_routes_and_bodies() {
    let server = MockServer::start(|req| match (req.method.as_str(), req.path()) {
        ("POST", "/auth/login") | ("POST", "/auth/register") | ("POST", "/auth/logout") => {
            Reply::json(200, json!({}))
        }
        ("GET", "/users/profile") => Reply::json(200, json!({ "data": support::user() })),
        ("PUT", "/users/password") => Reply::empty(204),
        ("DELETE", "/users/delete") => Reply::empty(204),
        ("GET", "/users/likes/articles") => {
            Reply::json(200, json!({ "data": [article(4, "Desk")] }))
        }
        ("GET", "/users/likes/products") => {
            Reply::json(200, json!({ "data": [product(3, "Chair"), product(9, "Lamp")] }))
        }
        ("GET", "/users/products") => Reply::json(200, json!({ "data": [] })),
        _ => Reply::empty(404),
    });
    let accounts = Arc::new(MarketAccountService::new(client(&server)));
    let manager = Manager::new(accounts.clone());

    manager
        .register(&Registration {
            email: "neighbor@example.com".into(),
            nickname: "neighbor".into(),
            password: "hunter22".into(),
        })
        .unwrap();
    assert!(!manager.is_signed_in());

    let user = manager
        .login(&Login {
            nickname: "neighbor".into(),
            password: "hunter22".into(),
        })
        .unwrap();
    assert_eq!(user.email, "neighbor@example.com");

    assert_eq!(accounts.liked_articles().unwrap()[0].title, "Desk");
    assert_eq!(accounts.liked_products().unwrap().len(), 2);
    assert!(accounts.my_products().unwrap().is_empty());

    manager
        .change_password(&PasswordChange {
            current_password: "hunter22".into(),
            new_password: "hunter23".into(),
        })
        .unwrap();
    manager.delete_account().unwrap();
    assert!(!manager.is_signed_in());

    let find = |method: &str, path: &str| {
        server
            .requests()
            .into_iter()
            .find(|r| r.method == method && r.path() == path)
            .unwrap()
    };
    assert_eq!(
        json_body(&find("POST", "/auth/register")),
        json!({ "email": "neighbor@example.com", "nickname": "neighbor", "password": "hunter22" })
    );
    assert_eq!(
        json_body(&find("POST", "/auth/login")),
        json!({ "nickname": "neighbor", "password": "hunter22" })
    );
    assert_eq!(
        json_body(&find("PUT", "/users/password")),
        json!({ "currentPassword": "hunter22", "newPassword": "hunter23" })
    );
    assert_eq!(server.hits("DELETE", "/users/delete"), 1);
}

#[test]
fn restore_without_session_is_signed_out() {
    let server = MockServer::start(|_| Reply::json(401, json!({ "message": "no session" })));
    let manager = Manager::new(Arc::new(MarketAccountService::new(client(&server))));

    assert_eq!(manager.restore().unwrap(), None);
    assert!(!manager.is_signed_in());
    assert_eq!(server.hits("GET", "/users/profile"), 1);
    assert_eq!(server.hits("POST", "/auth/refresh"), 1);
}

#[test]
fn restore_surfaces_server_failures() {
    let server = MockServer::start(|_| Reply::json(503, json!({ "error": "maintenance" })));
    let manager = Manager::new(Arc::new(MarketAccountService::new(client(&server))));

    let err = manager.restore().unwrap_err();
    assert!(matches!(err, ApiError::Status { .. }));
    assert_eq!(err.status(), Some(503));
    assert_eq!(err.server_message(), Some("maintenance"));
}
