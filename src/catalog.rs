// =============================================================================
// catalog.rs - WHERE WE GO KNOCKING
// =============================================================================
//
// The list of services a scan visits. There is a built-in catalog covering the
// usual suspects (developer hubs, social networks, video, gaming, a handful of
// Chinese platforms) and a loader for JSON catalogs when you want your own.
//
// Either way the result is validated before a single request goes out: every
// template needs its `{}`, every rendered URL has to parse, and names have to
// be unique because results are keyed on them downstream.
// =============================================================================

use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use url::Url;

use crate::error::CatalogError;
use crate::models::{render_template, CatalogEntry, SiteCategory, PLACEHOLDER};

/// Username substituted into templates when checking they render to a URL.
const VALIDATION_SAMPLE: &str = "probe";

type Row = (&'static str, &'static str, Option<&'static str>, SiteCategory, &'static [&'static str]);

const BUILT_IN: &[Row] = &[
    // Developer
    ("GitHub", "https://github.com/{}", Some("https://api.github.com/users/{}"), SiteCategory::Developer, &[]),
    ("GitLab", "https://gitlab.com/{}", None, SiteCategory::Developer, &[]),
    ("NPM", "https://www.npmjs.com/~{}", None, SiteCategory::Developer, &[]),
    ("PyPi", "https://pypi.org/user/{}", None, SiteCategory::Developer, &[]),
    // Social
    ("Twitter (X)", "https://x.com/{}", None, SiteCategory::Social, &[]),
    ("Facebook", "https://www.facebook.com/{}", None, SiteCategory::Social, &[]),
    ("Instagram", "https://www.instagram.com/{}", None, SiteCategory::Social, &[]),
    ("Reddit", "https://www.reddit.com/user/{}", Some("https://www.reddit.com/user/{}/about.json"), SiteCategory::Social, &[]),
    ("Pinterest", "https://www.pinterest.com/{}/", None, SiteCategory::Social, &[]),
    ("Telegram", "https://t.me/{}", None, SiteCategory::Social, &[]),
    ("Tumblr", "https://{}.tumblr.com", None, SiteCategory::Social, &[]),
    ("Mastodon (Social)", "https://mastodon.social/@{}", None, SiteCategory::Social, &[]),
    // Video
    ("YouTube", "https://www.youtube.com/@{}", None, SiteCategory::Video, &[]),
    ("Twitch", "https://www.twitch.tv/{}", None, SiteCategory::Video, &[]),
    ("Vimeo", "https://vimeo.com/{}", None, SiteCategory::Video, &[]),
    ("TikTok", "https://www.tiktok.com/@{}", None, SiteCategory::Video, &[]),
    // Gaming
    ("Steam", "https://steamcommunity.com/id/{}", None, SiteCategory::Gaming, &[]),
    ("Roblox", "https://www.roblox.com/user.aspx?username={}", None, SiteCategory::Gaming, &[]),
    ("Minecraft (NameMC)", "https://namemc.com/profile/{}", None, SiteCategory::Gaming, &[]),
    ("Osu!", "https://osu.ppy.sh/users/{}", None, SiteCategory::Gaming, &[]),
    // Design / art
    ("Behance", "https://www.behance.net/{}", None, SiteCategory::Other, &[]),
    ("Dribbble", "https://dribbble.com/{}", None, SiteCategory::Other, &[]),
    ("DeviantArt", "https://www.deviantart.com/{}", None, SiteCategory::Other, &[]),
    ("Flickr", "https://www.flickr.com/people/{}", None, SiteCategory::Other, &[]),
    // Adult
    ("PornHub", "https://www.pornhub.com/users/{}", None, SiteCategory::Adult, &[]),
    ("XHamster", "https://xhamster.com/users/{}", None, SiteCategory::Adult, &[]),
    ("OnlyFans", "https://onlyfans.com/{}", None, SiteCategory::Adult, &[]),
    ("Patreon", "https://www.patreon.com/{}", None, SiteCategory::Other, &[]),
    // Chinese / regional. Bilibili keys on numeric ids, hence the "404" page check.
    ("Bilibili", "https://space.bilibili.com/{}", None, SiteCategory::RegionalCn, &["404"]),
    ("Zhihu", "https://www.zhihu.com/people/{}", None, SiteCategory::RegionalCn, &[]),
    ("Weibo", "https://weibo.com/n/{}", None, SiteCategory::RegionalCn, &[]),
    ("Douyin", "https://www.douyin.com/user/{}", None, SiteCategory::RegionalCn, &[]),
    ("XiaoHongShu", "https://www.xiaohongshu.com/user/profile/{}", None, SiteCategory::RegionalCn, &[]),
    ("V2EX", "https://www.v2ex.com/member/{}", None, SiteCategory::RegionalCn, &[]),
    ("Gitee", "https://gitee.com/{}", None, SiteCategory::Developer, &[]),
    ("CSDN", "https://blog.csdn.net/{}", None, SiteCategory::Developer, &[]),
    ("Juejin", "https://juejin.cn/user/{}", None, SiteCategory::Developer, &[]),
    // Tech / news
    ("HackerNews", "https://news.ycombinator.com/user?id={}", None, SiteCategory::Social, &["No such user"]),
    ("ProductHunt", "https://www.producthunt.com/@{}", None, SiteCategory::Other, &[]),
    ("Medium", "https://medium.com/@{}", None, SiteCategory::Blogging, &[]),
    ("Wikipedia", "https://en.wikipedia.org/wiki/User:{}", None, SiteCategory::Other, &[]),
    ("Slack", "https://{}.slack.com", None, SiteCategory::Social, &[]),
    ("WordPress", "https://{}.wordpress.com", None, SiteCategory::Blogging, &[]),
    ("Blogger", "https://{}.blogspot.com", None, SiteCategory::Blogging, &[]),
    ("Pastebin", "https://pastebin.com/u/{}", None, SiteCategory::Developer, &[]),
];

/// The catalog shipped with the engine, in dispatch order.
pub fn default_catalog() -> Vec<Arc<CatalogEntry>> {
    BUILT_IN
        .iter()
        .map(|&(name, url, check_url, category, errors)| {
            let mut entry = CatalogEntry::new(name, url, category).with_error_strings(errors.iter().copied());
            if let Some(check_url) = check_url {
                entry = entry.with_check_url(check_url);
            }
            Arc::new(entry)
        })
        .collect()
}

/// Parse a JSON array of entries and validate it.
pub fn parse_catalog(json: &str) -> Result<Vec<Arc<CatalogEntry>>, CatalogError> {
    let entries: Vec<CatalogEntry> = serde_json::from_str(json)?;
    validate_catalog(&entries)?;
    Ok(entries.into_iter().map(Arc::new).collect())
}

/// Read and validate a JSON catalog from disk.
pub fn load_catalog(path: &Path) -> Result<Vec<Arc<CatalogEntry>>, CatalogError> {
    let raw = fs::read_to_string(path).map_err(|source| CatalogError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let entries = parse_catalog(&raw)?;
    info!(path = %path.display(), entries = entries.len(), "Catalog loaded");
    Ok(entries)
}

/// Check every entry before anything gets probed.
pub fn validate_catalog(entries: &[CatalogEntry]) -> Result<(), CatalogError> {
    let mut seen = HashSet::new();
    for entry in entries {
        if entry.name.trim().is_empty() {
            return Err(CatalogError::EmptyName);
        }
        if !seen.insert(entry.name.as_str()) {
            return Err(CatalogError::DuplicateName(entry.name.clone()));
        }
        validate_template(&entry.name, &entry.url)?;
        if let Some(check_url) = &entry.check_url {
            validate_template(&entry.name, check_url)?;
        }
    }
    Ok(())
}

fn validate_template(name: &str, template: &str) -> Result<(), CatalogError> {
    if !template.contains(PLACEHOLDER) {
        return Err(CatalogError::MissingPlaceholder {
            name: name.to_string(),
            template: template.to_string(),
        });
    }
    Url::parse(&render_template(template, VALIDATION_SAMPLE)).map_err(|e| CatalogError::InvalidUrl {
        name: name.to_string(),
        template: template.to_string(),
        reason: e.to_string(),
    })?;
    Ok(())
}
