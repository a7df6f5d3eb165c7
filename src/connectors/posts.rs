// 🎖️ Government-posts connector
// Each post names its first holder; the map is keyed by that member's id.

use super::{decode_json, string_or_number};
use crate::error::Result;
use crate::http::HttpFetch;
use crate::mappings::GovernmentPosts;
use serde::Deserialize;
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct PostEnvelope {
    value: PostValue,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostValue {
    name: String,
    #[serde(default)]
    post_holders: Vec<PostHolder>,
}

#[derive(Debug, Deserialize)]
struct PostHolder {
    member: MemberEnvelope,
}

#[derive(Debug, Deserialize)]
struct MemberEnvelope {
    value: MemberId,
}

#[derive(Debug, Deserialize)]
struct MemberId {
    #[serde(deserialize_with = "string_or_number")]
    id: String,
}

pub struct GovernmentPostsClient<'a, F: ?Sized> {
    fetcher: &'a F,
    url: String,
}

impl<'a, F: HttpFetch + ?Sized> GovernmentPostsClient<'a, F> {
    pub fn new(fetcher: &'a F, url: impl Into<String>) -> Self {
        GovernmentPostsClient {
            fetcher,
            url: url.into(),
        }
    }

    pub fn fetch_posts(&self) -> Result<GovernmentPosts> {
        info!(url = %self.url, "fetching government posts");
        let response = self.fetcher.get(&self.url, &[])?;
        let envelopes: Vec<PostEnvelope> = decode_json(&self.url, response)?;

        let mut posts = GovernmentPosts::new();
        for envelope in envelopes {
            let post = envelope.value;
            match post.post_holders.first() {
                Some(holder) => posts.insert(&holder.member.value.id, &post.name)?,
                None => debug!(post = %post.name, "vacant government post"),
            }
        }

        debug!(posts = posts.len(), "government posts parsed");
        Ok(posts)
    }
}
