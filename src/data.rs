use std::sync::Arc;

use crate::client::{Client, Request};
use crate::error::ApiError;
use crate::images::{self, ImageFile, UploadError};
use crate::model::{
    Article, ArticleDraft, Comment, CommentDraft, CommentPage, Envelope, Id, LikeState,
    ListQuery, Login, Page, PasswordChange, Product, ProductDraft, ProfileUpdate,
    Registration, UploadedImages, User,
};

/// The resource a comment thread hangs off. Only ever part of the path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Parent {
    Article(Id),
    Product(Id),
}

impl Parent {
    pub fn comments_path(&self) -> String {
        match self {
            Parent::Article(id) => format!("/articles/{id}/comments"),
            Parent::Product(id) => format!("/products/{id}/comments"),
        }
    }

    fn comment_path(&self, comment_id: Id) -> String {
        format!("{}/{}", self.comments_path(), comment_id)
    }
}

pub trait ArticleService: Send + Sync {
    fn list_articles(&self, query: ListQuery) -> Result<Page<Article>, ApiError>;
    fn article(&self, id: Id) -> Result<Article, ApiError>;
    fn create_article(&self, draft: &ArticleDraft) -> Result<Article, ApiError>;
    fn update_article(&self, id: Id, draft: &ArticleDraft) -> Result<Article, ApiError>;
    fn delete_article(&self, id: Id) -> Result<(), ApiError>;
    fn toggle_article_like(&self, id: Id) -> Result<LikeState, ApiError>;
}

pub trait ProductService: Send + Sync {
    fn list_products(&self, query: ListQuery) -> Result<Page<Product>, ApiError>;
    fn product(&self, id: Id) -> Result<Product, ApiError>;
    fn create_product(&self, draft: &ProductDraft) -> Result<Product, ApiError>;
    fn update_product(&self, id: Id, draft: &ProductDraft) -> Result<Product, ApiError>;
    fn delete_product(&self, id: Id) -> Result<(), ApiError>;
    fn toggle_product_like(&self, id: Id) -> Result<LikeState, ApiError>;
}

pub trait CommentService: Send + Sync {
    fn list_comments(
        &self,
        parent: Parent,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<CommentPage, ApiError>;
    fn create_comment(&self, parent: Parent, content: &str) -> Result<Comment, ApiError>;
    fn update_comment(&self, parent: Parent, id: Id, content: &str)
        -> Result<Comment, ApiError>;
    fn delete_comment(&self, parent: Parent, id: Id) -> Result<(), ApiError>;
}

pub trait AccountService: Send + Sync {
    fn login(&self, login: &Login) -> Result<(), ApiError>;
    fn register(&self, registration: &Registration) -> Result<(), ApiError>;
    fn logout(&self) -> Result<(), ApiError>;
    fn profile(&self) -> Result<User, ApiError>;
    fn update_profile(&self, update: &ProfileUpdate) -> Result<User, ApiError>;
    fn change_password(&self, change: &PasswordChange) -> Result<(), ApiError>;
    fn delete_account(&self) -> Result<(), ApiError>;
    fn liked_articles(&self) -> Result<Vec<Article>, ApiError>;
    fn liked_products(&self) -> Result<Vec<Product>, ApiError>;
    fn my_products(&self) -> Result<Vec<Product>, ApiError>;
}

pub trait ImageService: Send + Sync {
    fn upload_images(&self, files: &[ImageFile]) -> Result<Vec<String>, UploadError>;
}

pub struct MarketArticleService {
    client: Arc<Client>,
}

impl MarketArticleService {
    pub fn new(client: Arc<Client>) -> Self {
        Self { client }
    }
}

impl ArticleService for MarketArticleService {
    fn list_articles(&self, query: ListQuery) -> Result<Page<Article>, ApiError> {
        self.client
            .fetch(&Request::get("/articles").params(query.into_params()))
    }

    fn article(&self, id: Id) -> Result<Article, ApiError> {
        fetch_entity(&self.client, &Request::get(format!("/articles/{id}")))
    }

    fn create_article(&self, draft: &ArticleDraft) -> Result<Article, ApiError> {
        fetch_entity(&self.client, &Request::post("/articles").json(draft)?)
    }

    fn update_article(&self, id: Id, draft: &ArticleDraft) -> Result<Article, ApiError> {
        fetch_entity(
            &self.client,
            &Request::patch(format!("/articles/{id}")).json(draft)?,
        )
    }

    fn delete_article(&self, id: Id) -> Result<(), ApiError> {
        self.client.submit(&Request::delete(format!("/articles/{id}")))
    }

    fn toggle_article_like(&self, id: Id) -> Result<LikeState, ApiError> {
        fetch_entity(&self.client, &Request::post(format!("/articles/{id}/like")))
    }
}

pub struct MarketProductService {
    client: Arc<Client>,
}

impl MarketProductService {
    pub fn new(client: Arc<Client>) -> Self {
        Self { client }
    }
}

impl ProductService for MarketProductService {
    fn list_products(&self, query: ListQuery) -> Result<Page<Product>, ApiError> {
        self.client
            .fetch(&Request::get("/products").params(query.into_params()))
    }

    fn product(&self, id: Id) -> Result<Product, ApiError> {
        fetch_entity(&self.client, &Request::get(format!("/products/{id}")))
    }

    fn create_product(&self, draft: &ProductDraft) -> Result<Product, ApiError> {
        fetch_entity(&self.client, &Request::post("/products").json(draft)?)
    }

    fn update_product(&self, id: Id, draft: &ProductDraft) -> Result<Product, ApiError> {
        fetch_entity(
            &self.client,
            &Request::patch(format!("/products/{id}")).json(draft)?,
        )
    }

    fn delete_product(&self, id: Id) -> Result<(), ApiError> {
        self.client.submit(&Request::delete(format!("/products/{id}")))
    }

    fn toggle_product_like(&self, id: Id) -> Result<LikeState, ApiError> {
        fetch_entity(&self.client, &Request::post(format!("/products/{id}/like")))
    }
}

pub struct MarketCommentService {
    client: Arc<Client>,
}

impl MarketCommentService {
    pub fn new(client: Arc<Client>) -> Self {
        Self { client }
    }
}

impl CommentService for MarketCommentService {
    fn list_comments(
        &self,
        parent: Parent,
        cursor: Option<&str>,
        limit: usize,
    ) -> Result<CommentPage, ApiError> {
        let mut request = Request::get(parent.comments_path()).query("limit", limit);
        if let Some(cursor) = cursor {
            request = request.query("cursor", cursor);
        }
        self.client.fetch(&request)
    }

    fn create_comment(&self, parent: Parent, content: &str) -> Result<Comment, ApiError> {
        let content = require_content(content)?;
        fetch_entity(
            &self.client,
            &Request::post(parent.comments_path()).json(&CommentDraft { content })?,
        )
    }

    fn update_comment(
        &self,
        parent: Parent,
        id: Id,
        content: &str,
    ) -> Result<Comment, ApiError> {
        let content = require_content(content)?;
        fetch_entity(
            &self.client,
            &Request::patch(parent.comment_path(id)).json(&CommentDraft { content })?,
        )
    }

    fn delete_comment(&self, parent: Parent, id: Id) -> Result<(), ApiError> {
        self.client.submit(&Request::delete(parent.comment_path(id)))
    }
}

pub struct MarketAccountService {
    client: Arc<Client>,
}

impl MarketAccountService {
    pub fn new(client: Arc<Client>) -> Self {
        Self { client }
    }
}

impl AccountService for MarketAccountService {
    fn login(&self, login: &Login) -> Result<(), ApiError> {
        self.client.submit(&Request::post("/auth/login").json(login)?)
    }

    fn register(&self, registration: &Registration) -> Result<(), ApiError> {
        self.client
            .submit(&Request::post("/auth/register").json(registration)?)
    }

    fn logout(&self) -> Result<(), ApiError> {
        self.client.submit(&Request::post("/auth/logout"))
    }

    fn profile(&self) -> Result<User, ApiError> {
        fetch_entity(&self.client, &Request::get("/users/profile"))
    }

    fn update_profile(&self, update: &ProfileUpdate) -> Result<User, ApiError> {
        fetch_entity(&self.client, &Request::put("/users/profile").json(update)?)
    }

    fn change_password(&self, change: &PasswordChange) -> Result<(), ApiError> {
        self.client
            .submit(&Request::put("/users/password").json(change)?)
    }

    fn delete_account(&self) -> Result<(), ApiError> {
        self.client.submit(&Request::delete("/users/delete"))
    }

    fn liked_articles(&self) -> Result<Vec<Article>, ApiError> {
        fetch_entity(&self.client, &Request::get("/users/likes/articles"))
    }

    fn liked_products(&self) -> Result<Vec<Product>, ApiError> {
        fetch_entity(&self.client, &Request::get("/users/likes/products"))
    }

    fn my_products(&self) -> Result<Vec<Product>, ApiError> {
        fetch_entity(&self.client, &Request::get("/users/products"))
    }
}

pub struct MarketImageService {
    client: Arc<Client>,
}

impl MarketImageService {
    pub fn new(client: Arc<Client>) -> Self {
        Self { client }
    }
}

impl ImageService for MarketImageService {
    fn upload_images(&self, files: &[ImageFile]) -> Result<Vec<String>, UploadError> {
        images::validate(files, 0)?;
        let mut request = Request::post("/api/images");
        for file in files {
            request = request.file(
                images::UPLOAD_FIELD,
                file.file_name.clone(),
                file.mime.clone(),
                file.bytes.clone(),
            );
        }
        let uploaded: UploadedImages = self.client.fetch(&request)?;
        Ok(uploaded.urls)
    }
}

fn fetch_entity<T>(client: &Client, request: &Request) -> Result<T, ApiError>
where
    T: serde::de::DeserializeOwned,
{
    client.fetch::<Envelope<T>>(request).map(Envelope::into_inner)
}

fn require_content(content: &str) -> Result<&str, ApiError> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Err(ApiError::InvalidRequest("comment content is required".into()));
    }
    Ok(content)
}
