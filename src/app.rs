use std::env;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::client::Client;
use crate::config;
use crate::data::{
    ArticleService, MarketArticleService, MarketCommentService, MarketProductService, Parent,
    ProductService,
};
use crate::feed::{CommentFeed, CommentSource, Feed};
use crate::model::{Id, ListQuery, PageMeta};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "MARKET_CONFIG";

pub const USAGE: &str = "\
Commands:
  articles [page] [keyword]              List articles
  products [page] [keyword]              List products
  article <id>                           Show one article
  product <id>                           Show one product
  comments <article|product> <id> [pages]
                                         Show the comment thread, one page by default";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Articles(ListQuery),
    Products(ListQuery),
    Article(Id),
    Product(Id),
    Comments { parent: Parent, pages: usize },
}

impl Command {
    pub fn parse(args: &[String]) -> Result<Option<Command>> {
        let Some((name, rest)) = args.split_first() else {
            return Ok(None);
        };
        let command = match name.as_str() {
            "articles" => Command::Articles(list_query(rest)?),
            "products" => Command::Products(list_query(rest)?),
            "article" => Command::Article(parse_id(rest.first())?),
            "product" => Command::Product(parse_id(rest.first())?),
            "comments" => {
                let id = parse_id(rest.get(1))?;
                let parent = match rest.first().map(String::as_str) {
                    Some("article") => Parent::Article(id),
                    Some("product") => Parent::Product(id),
                    other => bail!("comments: expected `article` or `product`, got {other:?}"),
                };
                let pages = match rest.get(2) {
                    Some(raw) => raw
                        .parse::<usize>()
                        .ok()
                        .filter(|pages| *pages > 0)
                        .with_context(|| format!("comments: invalid page count {raw:?}"))?,
                    None => 1,
                };
                Command::Comments { parent, pages }
            }
            other => bail!("unknown command {other:?}\n\n{USAGE}"),
        };
        Ok(Some(command))
    }
}

fn list_query(args: &[String]) -> Result<ListQuery> {
    let mut query = ListQuery::default();
    if let Some(raw) = args.first() {
        let page = raw
            .parse::<u32>()
            .with_context(|| format!("invalid page {raw:?}"))?;
        query = ListQuery::page(page);
    }
    if args.len() > 1 {
        query = query.with_keyword(args[1..].join(" "));
    }
    Ok(query)
}

fn parse_id(raw: Option<&String>) -> Result<Id> {
    let raw = raw.context("missing id")?;
    raw.parse::<Id>()
        .with_context(|| format!("invalid id {raw:?}"))
}

pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "market_client=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .try_init();
}

pub fn run() -> Result<()> {
    init_tracing();
    let args: Vec<String> = env::args().skip(1).collect();
    let Some(command) = Command::parse(&args)? else {
        println!("{USAGE}");
        return Ok(());
    };

    let cfg = config::load(config::LoadOptions {
        config_file: env::var_os(CONFIG_ENV).map(PathBuf::from),
        env_prefix: None,
    })
    .context("load config")?;
    let client = Arc::new(Client::new(cfg.client_config()).context("build api client")?);
    tracing::debug!(base_url = %client.base_url(), ?command, "running command");

    let stdout = io::stdout();
    let mut out = stdout.lock();
    execute(&command, &client, cfg.comments.page_size, &mut out)
}

pub fn execute<W: Write>(
    command: &Command,
    client: &Arc<Client>,
    page_size: usize,
    out: &mut W,
) -> Result<()> {
    match command {
        Command::Articles(query) => {
            let page = MarketArticleService::new(client.clone())
                .list_articles(query.clone())
                .context("list articles")?;
            for article in &page.data {
                writeln!(
                    out,
                    "#{} {} by {} ({} likes, {} comments)",
                    article.id,
                    article.title,
                    article.author_name(),
                    article.like_count,
                    article.comment_count
                )?;
            }
            write_meta(out, &page.meta)?;
        }
        Command::Products(query) => {
            let page = MarketProductService::new(client.clone())
                .list_products(query.clone())
                .context("list products")?;
            for product in &page.data {
                writeln!(
                    out,
                    "#{} {} - {} ({} likes)",
                    product.id, product.name, product.price, product.like_count
                )?;
            }
            write_meta(out, &page.meta)?;
        }
        Command::Article(id) => {
            let article = MarketArticleService::new(client.clone())
                .article(*id)
                .with_context(|| format!("load article {id}"))?;
            writeln!(out, "{}", article.title)?;
            writeln!(
                out,
                "by {} on {}",
                article.author_name(),
                article.created_at.format("%Y-%m-%d")
            )?;
            writeln!(out)?;
            writeln!(out, "{}", article.content)?;
            writeln!(out)?;
            writeln!(out, "{} likes", article.like_count)?;
        }
        Command::Product(id) => {
            let product = MarketProductService::new(client.clone())
                .product(*id)
                .with_context(|| format!("load product {id}"))?;
            writeln!(out, "{} - {}", product.name, product.price)?;
            if !product.tags.is_empty() {
                writeln!(out, "tags: {}", product.tags.join(", "))?;
            }
            writeln!(out)?;
            writeln!(out, "{}", product.description)?;
            for url in product.image_urls() {
                writeln!(out, "image: {url}")?;
            }
            writeln!(out, "{} likes", product.like_count)?;
        }
        Command::Comments { parent, pages } => {
            let comments: CommentFeed = Feed::with_page_size(
                CommentSource::new(
                    Arc::new(MarketCommentService::new(client.clone())),
                    *parent,
                ),
                page_size,
            );
            comments.load_initial().context("load comments")?;
            for _ in 1..*pages {
                if !comments.has_more() {
                    break;
                }
                comments.load_more().context("load more comments")?;
            }
            for comment in comments.items() {
                writeln!(
                    out,
                    "#{} {}: {}",
                    comment.id,
                    comment.author_name(),
                    comment.content
                )?;
            }
            if comments.has_more() {
                writeln!(out, "(more comments available)")?;
            }
        }
    }
    Ok(())
}

fn write_meta<W: Write>(out: &mut W, meta: &PageMeta) -> io::Result<()> {
    writeln!(
        out,
        "page {}/{} ({} total)",
        meta.page,
        meta.total_pages.max(1),
        meta.total
    )
}
