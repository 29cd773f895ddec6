//! 浏览数据聚合。
//!
//! 存储层只负责取出某个作者名下的作品与浏览记录，分组统计都在这里完成。

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::database::{Artwork, ViewEvent};

/// 浏览趋势统计的天数窗口（含今天）
pub const VIEWS_WINDOW_DAYS: i64 = 6;
pub const ENGAGEMENT_TOP_N: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewerSplit {
    #[serde(rename = "_id")]
    pub viewer: &'static str,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub total_artworks: u64,
    pub total_views: u64,
    pub viewer_split: Vec<ViewerSplit>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyViews {
    #[serde(rename = "_id")]
    pub date: String,
    pub views: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArtworkEngagement {
    #[serde(rename = "_id")]
    pub artwork_id: Uuid,
    pub title: String,
    pub views: u64,
}

pub fn overview(total_artworks: usize, views: &[ViewEvent]) -> Overview {
    let authenticated = views.iter().filter(|v| v.user_id.is_some()).count() as u64;
    let public = views.len() as u64 - authenticated;

    // 与分组统计一致：没有记录的分组不出现
    let viewer_split = [("authenticated", authenticated), ("public", public)]
        .into_iter()
        .filter(|(_, count)| *count > 0)
        .map(|(viewer, count)| ViewerSplit { viewer, count })
        .collect();

    Overview {
        total_artworks: total_artworks as u64,
        total_views: views.len() as u64,
        viewer_split,
    }
}

/// 按 UTC 日期分组，只统计 `since` 之后的记录，日期升序
pub fn views_over_time(views: &[ViewEvent], since: DateTime<Utc>) -> Vec<DailyViews> {
    let mut per_day: BTreeMap<String, u64> = BTreeMap::new();
    for view in views.iter().filter(|v| v.created_at >= since) {
        *per_day
            .entry(view.created_at.format("%Y-%m-%d").to_string())
            .or_default() += 1;
    }
    per_day
        .into_iter()
        .map(|(date, views)| DailyViews { date, views })
        .collect()
}

/// 公开作品按累计浏览数降序；浏览数相同时保持原有顺序
pub fn most_viewed(mut artworks: Vec<Artwork>) -> Vec<Artwork> {
    artworks.retain(|a| a.is_public);
    artworks.sort_by(|a, b| b.views.cmp(&a.views));
    artworks
}

/// 按浏览记录数排出前五的作品；找不到对应作品的记录被忽略
pub fn engagement_split(views: &[ViewEvent], artworks: &[Artwork]) -> Vec<ArtworkEngagement> {
    let mut counts: HashMap<Uuid, u64> = HashMap::new();
    for view in views {
        *counts.entry(view.artwork_id).or_default() += 1;
    }

    let mut ranked: Vec<ArtworkEngagement> = artworks
        .iter()
        .filter_map(|artwork| {
            counts.get(&artwork.id).map(|&views| ArtworkEngagement {
                artwork_id: artwork.id,
                title: artwork.title.clone(),
                views,
            })
        })
        .collect();
    ranked.sort_by(|a, b| b.views.cmp(&a.views).then_with(|| a.title.cmp(&b.title)));
    ranked.truncate(ENGAGEMENT_TOP_N);
    ranked
}
