//! News article routes

use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use tracing::warn;

use newsflow_core::{Article, NewsflowError, Paginated, Sentiment};
use newsflow_retrieval::cache::keys;
use newsflow_retrieval::{CompositeQuery, SimilarOptions, TrendPeriod, ViewContext};

use crate::error::ApiError;
use crate::routes::{envelope_with_extras, PageQuery};
use crate::server::AppState;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/news")
            // Literal segments must register ahead of the id matcher
            .route("/search", web::get().to(search))
            .route("/trending", web::get().to(trending))
            .route("/topic/{topic}", web::get().to(by_topic))
            .route("/sentiment/{sentiment}", web::get().to(by_sentiment))
            .route("", web::get().to(list))
            .route("/{id}", web::get().to(get_by_id))
            .route("/{id}/similar", web::get().to(similar))
            .route("/{id}/metrics", web::get().to(metrics)),
    );
}

/// Cached window of the newest-articles listing
#[derive(Debug, Serialize, Deserialize)]
struct ArticleListCache {
    articles: Vec<Article>,
    total: u64,
}

/// GET /api/news: newest articles, with a short-lived list cache
async fn list(
    state: web::Data<AppState>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, ApiError> {
    let params = query.into_inner().validate()?;
    let service = &state.service;
    let cache_key = keys::all_articles(params.limit, params.offset());

    let cached: Option<ArticleListCache> = service
        .cache
        .get_json(&cache_key)
        .await
        .ok()
        .flatten();

    let (listing, cached_hit) = match cached {
        Some(listing) => (listing, true),
        None => {
            let page = service.index.newest(params.limit, params.offset()).await?;
            let listing = ArticleListCache {
                articles: page
                    .articles
                    .into_iter()
                    .map(Article::without_vector)
                    .collect(),
                total: page.total,
            };
            let ttl = service.config.cache.all_articles_ttl_sec;
            if let Err(e) = service.cache.set_json(&cache_key, &listing, ttl).await {
                warn!(error = %e, "Article list cache write failed");
            }
            (listing, false)
        }
    };

    let page = Paginated::new(listing.articles, listing.total as usize, params, "/api/news");
    Ok(HttpResponse::Ok().json(envelope_with_extras(
        page,
        &[("cached", serde_json::json!(cached_hit))],
    )))
}

/// GET /api/news/{id}: article by id
///
/// Side effects: increments view metrics; when a user is identified
/// (`x-user-id` header or `?userId`), marks the article read and
/// invalidates that user's personalized caches.
async fn get_by_id(
    state: web::Data<AppState>,
    path: web::Path<String>,
    req: HttpRequest,
    query: web::Query<UserQuery>,
) -> Result<HttpResponse, ApiError> {
    let article_id = path.into_inner();
    let service = &state.service;

    let Some(article) = service.index.get_doc(&article_id).await? else {
        return Err(ApiError(NewsflowError::NotFound(format!(
            "article {article_id} not found"
        ))));
    };

    let user_id = query
        .user_id
        .clone()
        .or_else(|| header_value(&req, "x-user-id"));

    let ctx = ViewContext {
        ip: req
            .connection_info()
            .realip_remote_addr()
            .map(|s| s.to_string()),
        user_id: user_id.clone(),
        user_agent: header_value(&req, "user-agent"),
        referrer: header_value(&req, "referer"),
        language: header_value(&req, "accept-language"),
    };

    // Metrics are best-effort; the article is served regardless
    let snapshot = match service.metrics.record_view(&article_id, &ctx).await {
        Ok(snapshot) => Some(snapshot),
        Err(e) => {
            warn!(article_id = %article_id, error = %e, "View recording failed");
            None
        }
    };

    if let Some(user_id) = &user_id {
        if let Err(e) = service.read_history.mark_read(user_id, &article_id).await {
            warn!(user_id = %user_id, error = %e, "Read marking failed");
        }
        if let Err(e) = service.personalization.invalidate_user_caches(user_id).await {
            warn!(user_id = %user_id, error = %e, "Personalized cache invalidation failed");
        }
    }

    let mut body = serde_json::to_value(article.without_vector()).unwrap_or_default();
    if let Some(object) = body.as_object_mut() {
        object.insert(
            "metrics".to_string(),
            serde_json::to_value(snapshot).unwrap_or(serde_json::Value::Null),
        );
    }
    Ok(HttpResponse::Ok().json(body))
}

#[derive(Debug, Deserialize)]
struct UserQuery {
    #[serde(rename = "userId")]
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SimilarQuery {
    page: Option<usize>,
    limit: Option<usize>,
    refresh: Option<bool>,
}

/// GET /api/news/{id}/similar
async fn similar(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<SimilarQuery>,
) -> Result<HttpResponse, ApiError> {
    let article_id = path.into_inner();
    let params = PageQuery {
        page: query.page,
        limit: query.limit,
    }
    .validate()?;

    let response = state
        .service
        .similarity
        .similar(
            &article_id,
            params.limit,
            params.offset(),
            SimilarOptions {
                force_refresh: query.refresh.unwrap_or(false),
            },
        )
        .await;

    let base_url = format!("/api/news/{article_id}/similar");
    let page = Paginated::new(response.articles, response.total, params, &base_url);

    let mut extras = vec![
        ("cached", serde_json::json!(response.cached)),
        ("method", serde_json::json!(response.method)),
    ];
    if let Some(age) = response.cache_age_ms {
        extras.push(("cacheAgeMs", serde_json::json!(age)));
    }
    if response.fallback {
        extras.push(("fallback", serde_json::json!(true)));
    }
    if let Some(error) = &response.error {
        extras.push(("error", serde_json::json!(error)));
    }

    Ok(HttpResponse::Ok().json(envelope_with_extras(page, &extras)))
}

/// GET /api/news/{id}/metrics
async fn metrics(
    state: web::Data<AppState>,
    path: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let report = state.service.metrics.metrics(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(report))
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    q: Option<String>,
    sentiment: Option<String>,
    source: Option<String>,
    topic: Option<String>,
    page: Option<usize>,
    limit: Option<usize>,
}

fn parse_sentiment(raw: Option<&str>) -> Result<Option<Sentiment>, ApiError> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(s) => s
            .parse::<Sentiment>()
            .map(Some)
            .map_err(|e| ApiError(NewsflowError::BadInput(e))),
    }
}

/// GET /api/news/search: composite search dispatch
async fn search(
    state: web::Data<AppState>,
    query: web::Query<SearchQuery>,
) -> Result<HttpResponse, ApiError> {
    let params = PageQuery {
        page: query.page,
        limit: query.limit,
    }
    .validate()?;

    let composite = CompositeQuery {
        q: query.q.clone(),
        sentiment: parse_sentiment(query.sentiment.as_deref())?,
        source: query.source.clone(),
        topic: query.topic.clone(),
    };

    let page = state
        .service
        .index
        .composite_search(&composite, params.limit, params.offset())
        .await?;

    let data: Vec<Article> = page
        .articles
        .into_iter()
        .map(Article::without_vector)
        .collect();
    Ok(HttpResponse::Ok().json(Paginated::new(
        data,
        page.total as usize,
        params,
        "/api/news/search",
    )))
}

/// GET /api/news/topic/{topic}
async fn by_topic(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, ApiError> {
    let topic = path.into_inner();
    let params = query.into_inner().validate()?;

    let composite = CompositeQuery {
        topic: Some(topic.clone()),
        ..Default::default()
    };
    let page = state
        .service
        .index
        .composite_search(&composite, params.limit, params.offset())
        .await?;

    let data: Vec<Article> = page
        .articles
        .into_iter()
        .map(Article::without_vector)
        .collect();
    let base_url = format!("/api/news/topic/{topic}");
    Ok(HttpResponse::Ok().json(Paginated::new(data, page.total as usize, params, &base_url)))
}

/// GET /api/news/sentiment/{sentiment}
async fn by_sentiment(
    state: web::Data<AppState>,
    path: web::Path<String>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, ApiError> {
    let raw = path.into_inner();
    let sentiment = parse_sentiment(Some(&raw))?.ok_or_else(|| {
        ApiError(NewsflowError::BadInput("sentiment is required".to_string()))
    })?;
    let params = query.into_inner().validate()?;

    let composite = CompositeQuery {
        sentiment: Some(sentiment),
        ..Default::default()
    };
    let page = state
        .service
        .index
        .composite_search(&composite, params.limit, params.offset())
        .await?;

    let data: Vec<Article> = page
        .articles
        .into_iter()
        .map(Article::without_vector)
        .collect();
    let base_url = format!("/api/news/sentiment/{raw}");
    Ok(HttpResponse::Ok().json(Paginated::new(data, page.total as usize, params, &base_url)))
}

#[derive(Debug, Deserialize)]
struct TrendingQuery {
    limit: Option<usize>,
    period: Option<String>,
}

/// GET /api/news/trending
async fn trending(
    state: web::Data<AppState>,
    query: web::Query<TrendingQuery>,
) -> Result<HttpResponse, ApiError> {
    let limit = query.limit.unwrap_or(10);
    if limit < 1 || limit > 100 {
        return Err(ApiError(NewsflowError::BadInput(
            "limit must be between 1 and 100".to_string(),
        )));
    }
    let period = TrendPeriod::from_param(query.period.as_deref());

    let trending = state.service.metrics.trending(limit, period).await?;
    let count = trending.len();
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "data": trending,
        "count": count,
    })))
}

fn header_value(req: &HttpRequest, name: &str) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}
