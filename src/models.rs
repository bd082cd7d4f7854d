use std::fmt;
use std::hash::Hash;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub type ItemId = u64;

/// A value that can live in a [`KeyValueStore`](crate::store::KeyValueStore).
pub trait Keyed {
    type Key: Eq + Hash + Clone + fmt::Debug + Send + Sync;

    fn key(&self) -> Self::Key;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Story,
    Comment,
    Job,
    Poll,
    PollOpt,
}

/// An item as served by `item/{id}`. Fields the API omits stay `None` / empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    #[serde(rename = "type")]
    pub kind: Option<ItemKind>,
    pub by: Option<String>,
    /// Unix seconds
    pub time: Option<i64>,
    pub text: Option<String>,
    pub url: Option<String>,
    pub score: Option<i64>,
    pub title: Option<String>,
    pub parent: Option<ItemId>,
    pub poll: Option<ItemId>,
    #[serde(default)]
    pub kids: Vec<ItemId>,
    #[serde(default)]
    pub parts: Vec<ItemId>,
    pub descendants: Option<i64>,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub dead: bool,
}

lazy_static! {
    static ref ITEM_LINK: Regex =
        Regex::new(r#"<a\s+href="item\?id=\d+"[^>]*>([^<]+)</a>"#).expect("valid regex");
    static ref PARAGRAPH: Regex = Regex::new(r"(?i)<p\s*/?>").expect("valid regex");
    static ref TAG: Regex = Regex::new(r"<[^>]+>").expect("valid regex");
}

impl Item {
    pub fn new(id: ItemId) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    pub fn is_comment(&self) -> bool {
        self.kind == Some(ItemKind::Comment)
    }

    pub fn is_story_like(&self) -> bool {
        matches!(self.kind, Some(ItemKind::Story | ItemKind::Job | ItemKind::Poll))
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp(self.time?, 0)
    }

    /// Whether the item should be shown under the given `showDead`/`showDeleted` flags.
    pub fn is_visible(&self, show_dead: bool, show_deleted: bool) -> bool {
        (show_dead || !self.dead) && (show_deleted || !self.deleted)
    }

    /// `text` with markup stripped and entities decoded; paragraphs become blank lines.
    pub fn plain_text(&self) -> Option<String> {
        let html = self.text.as_deref()?;
        let text = ITEM_LINK.replace_all(html, "$1");
        let text = PARAGRAPH.replace_all(&text, "\n\n");
        let text = TAG.replace_all(&text, "");
        Some(html_escape::decode_html_entities(text.trim()).into_owned())
    }

    /// Host part of `url`, without a leading `www.`.
    pub fn domain(&self) -> Option<String> {
        let parsed = url::Url::parse(self.url.as_deref()?).ok()?;
        let host = parsed.host_str()?;
        let host = host.strip_prefix("www.").unwrap_or(host);
        Some(host.to_string())
    }
}

impl Keyed for Item {
    type Key = ItemId;

    fn key(&self) -> ItemId {
        self.id
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    /// The user's handle
    pub id: String,
    #[serde(default)]
    pub created: i64,
    #[serde(default)]
    pub karma: i64,
    pub about: Option<String>,
    #[serde(default)]
    pub submitted: Vec<ItemId>,
    /// Average reply delay in seconds
    pub delay: Option<i64>,
}

impl UserProfile {
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        DateTime::<Utc>::from_timestamp(self.created, 0)
    }
}

impl Keyed for UserProfile {
    type Key = String;

    fn key(&self) -> String {
        self.id.clone()
    }
}

/// A node of an assembled comment tree.
///
/// `item` being present means the node is hydrated, `children` being present
/// means it is expanded. The two are independent. When expanded, children
/// follow the order of the item's `kids`.
#[derive(Debug, Clone, PartialEq)]
pub struct CommentNode {
    pub id: ItemId,
    pub item: Option<Item>,
    pub children: Option<Vec<CommentNode>>,
}

impl CommentNode {
    pub fn pending(id: ItemId) -> Self {
        Self {
            id,
            item: None,
            children: None,
        }
    }

    pub fn hydrated(item: Item) -> Self {
        Self {
            id: item.id,
            item: Some(item),
            children: None,
        }
    }

    pub fn expanded(item: Item, children: Vec<CommentNode>) -> Self {
        Self {
            id: item.id,
            item: Some(item),
            children: Some(children),
        }
    }

    pub fn is_hydrated(&self) -> bool {
        self.item.is_some()
    }

    pub fn is_expanded(&self) -> bool {
        self.children.is_some()
    }

    /// Materialized children, empty when not expanded.
    pub fn kids(&self) -> &[CommentNode] {
        self.children.as_deref().unwrap_or(&[])
    }

    pub fn descendant_count(&self) -> usize {
        self.kids().iter().map(|kid| 1 + kid.descendant_count()).sum()
    }

    pub fn find(&self, id: ItemId) -> Option<&CommentNode> {
        if self.id == id {
            return Some(self);
        }
        self.kids().iter().find_map(|kid| kid.find(id))
    }

    /// Every id in the subtree, this node included, depth first.
    pub fn ids(&self) -> Vec<ItemId> {
        let mut ids = vec![self.id];
        for kid in self.kids() {
            ids.extend(kid.ids());
        }
        ids
    }
}

impl Keyed for CommentNode {
    type Key = ItemId;

    fn key(&self) -> ItemId {
        self.id
    }
}

/// Point-in-time result of the `updates` endpoint plus everything it names,
/// resolved. Replaced wholesale, never merged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdatesSnapshot {
    pub item_ids: Vec<ItemId>,
    pub profile_ids: Vec<String>,
    pub items: Vec<Item>,
    pub profiles: Vec<UserProfile>,
    pub fetched_at: Option<DateTime<Utc>>,
}

impl UpdatesSnapshot {
    pub fn item(&self, id: ItemId) -> Option<&Item> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn profile(&self, handle: &str) -> Option<&UserProfile> {
        self.profiles.iter().find(|profile| profile.id == handle)
    }

    pub fn comments(&self) -> impl Iterator<Item = &Item> {
        self.items.iter().filter(|item| item.is_comment())
    }

    pub fn stories(&self) -> impl Iterator<Item = &Item> {
        self.items.iter().filter(|item| item.is_story_like())
    }
}

/// Raw body of the `updates` endpoint.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub(crate) struct UpdatesPayload {
    #[serde(default)]
    pub items: Vec<ItemId>,
    #[serde(default)]
    pub profiles: Vec<String>,
}

/// A ranked story listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Listing {
    Top,
    New,
    Best,
    Show,
    Ask,
    Jobs,
}

impl Listing {
    pub const ALL: [Listing; 6] = [
        Listing::Top,
        Listing::New,
        Listing::Best,
        Listing::Show,
        Listing::Ask,
        Listing::Jobs,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Listing::Top => "top",
            Listing::New => "new",
            Listing::Best => "best",
            Listing::Show => "show",
            Listing::Ask => "ask",
            Listing::Jobs => "jobs",
        }
    }

    /// API path holding the ranked ids.
    pub fn path(self) -> &'static str {
        match self {
            Listing::Top => "topstories",
            Listing::New => "newstories",
            Listing::Best => "beststories",
            Listing::Show => "showstories",
            Listing::Ask => "askstories",
            Listing::Jobs => "jobstories",
        }
    }
}

impl fmt::Display for Listing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown listing `{0}`")]
pub struct UnknownListing(pub String);

impl FromStr for Listing {
    type Err = UnknownListing;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Listing::ALL
            .into_iter()
            .find(|listing| listing.name() == s || listing.path() == s)
            .ok_or_else(|| UnknownListing(s.to_string()))
    }
}
