use crate::domain::instrument::Instrument;
use anyhow::Context;
use reqwest::Url;
use serde::{Deserialize, Serialize};

const KOREA: &str = "한국";
const UNITED_STATES: &str = "미국";

/// A news search link for one instrument. Nothing is fetched; the links point
/// at the sources' own search pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleLink {
    pub title: String,
    pub url: String,
    pub source: String,
}

impl ArticleLink {
    fn new(title: String, url: Url, source: &str) -> Self {
        Self {
            title,
            url: url.to_string(),
            source: source.to_string(),
        }
    }
}

/// Google News for every instrument; Naver and Daum for Korean listings, Yahoo
/// Finance and MarketWatch for US listings.
pub fn news_links(instrument: &Instrument) -> anyhow::Result<Vec<ArticleLink>> {
    let name = instrument.name.as_str();
    let ticker = instrument.ticker.as_str();
    let is_us = instrument.country == UNITED_STATES;

    let (query, lang) = if is_us {
        (format!("{name} {ticker} stock news"), "en")
    } else {
        (format!("{name} {ticker} 주가 뉴스"), "ko")
    };
    let mut links = vec![ArticleLink::new(
        format!("{name} 최신 뉴스 (Google News)"),
        search_url(
            "https://www.google.com/search",
            &[("q", query.as_str()), ("tbm", "nws"), ("hl", lang)],
        )?,
        "Google News",
    )];

    if instrument.country == KOREA {
        let naver_query = format!("{name} 주가 뉴스");
        let daum_query = format!("{name} 주가");
        links.push(ArticleLink::new(
            format!("{name} 네이버 뉴스"),
            search_url(
                "https://search.naver.com/search.naver",
                &[("where", "news"), ("query", naver_query.as_str())],
            )?,
            "Naver News",
        ));
        links.push(ArticleLink::new(
            format!("{name} 다음 뉴스"),
            search_url(
                "https://search.daum.net/search",
                &[("w", "news"), ("q", daum_query.as_str())],
            )?,
            "Daum News",
        ));
    }

    if is_us {
        links.push(ArticleLink::new(
            format!("{name} Yahoo Finance 뉴스"),
            path_url("https://finance.yahoo.com/quote/", &[ticker, "news"])?,
            "Yahoo Finance",
        ));
        links.push(ArticleLink::new(
            format!("{name} MarketWatch 뉴스"),
            path_url("https://www.marketwatch.com/investing/stock/", &[ticker])?,
            "MarketWatch",
        ));
    }

    Ok(links)
}

fn search_url(base: &str, params: &[(&str, &str)]) -> anyhow::Result<Url> {
    Url::parse_with_params(base, params).with_context(|| format!("invalid news url {base}"))
}

fn path_url(base: &str, segments: &[&str]) -> anyhow::Result<Url> {
    let mut url = Url::parse(base).with_context(|| format!("invalid news url {base}"))?;
    url.path_segments_mut()
        .map_err(|_| anyhow::anyhow!("news url {base} cannot take path segments"))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
