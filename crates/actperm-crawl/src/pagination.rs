//! Cursor-based pagination for GraphQL connections.

use crate::error::{CrawlError, Result};
use serde::Deserialize;
use std::future::Future;

/// Continuation state returned with every page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    /// Whether another page follows.
    pub has_next_page: bool,
    /// Cursor to pass as `after` for the next page.
    pub end_cursor: Option<String>,
}

/// One page of a GraphQL connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection<T> {
    #[serde(default = "Vec::new")]
    pub nodes: Vec<T>,
    pub page_info: PageInfo,
}

/// Fetch pages one after another until `hasNextPage` is false.
///
/// `fetch` receives the cursor of the previous page (`None` for the first
/// one). A page that claims a successor but carries no cursor is an error.
pub async fn collect_pages<T, F, Fut>(mut fetch: F) -> Result<Vec<T>>
where
    F: FnMut(Option<String>) -> Fut,
    Fut: Future<Output = Result<Connection<T>>>,
{
    let mut all_nodes = Vec::new();
    let mut cursor = None;

    loop {
        let page = fetch(cursor.take()).await?;
        all_nodes.extend(page.nodes);

        if !page.page_info.has_next_page {
            break;
        }
        match page.page_info.end_cursor {
            Some(next) => cursor = Some(next),
            None => {
                return Err(CrawlError::ApiError {
                    status: 200,
                    message: "hasNextPage set without endCursor".to_string(),
                })
            }
        }
    }

    Ok(all_nodes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    fn page(nodes: Vec<u32>, next: Option<&str>) -> Connection<u32> {
        Connection {
            nodes,
            page_info: PageInfo {
                has_next_page: next.is_some(),
                end_cursor: next.map(str::to_string),
            },
        }
    }

    #[tokio::test]
    async fn test_accumulates_all_pages_in_order() {
        let seen = RefCell::new(Vec::new());
        let pages = RefCell::new(vec![
            page(vec![1, 2], Some("c1")),
            page(vec![3], Some("c2")),
            page(vec![4, 5, 6], None),
        ]);

        let nodes = collect_pages(|cursor| {
            seen.borrow_mut().push(cursor);
            let next = pages.borrow_mut().remove(0);
            async move { Ok(next) }
        })
        .await
        .unwrap();

        assert_eq!(nodes, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(
            seen.into_inner(),
            vec![None, Some("c1".to_string()), Some("c2".to_string())]
        );
        assert!(pages.borrow().is_empty());
    }

    #[tokio::test]
    async fn test_stops_when_no_next_page() {
        let calls = RefCell::new(0);
        let nodes = collect_pages(|_| {
            *calls.borrow_mut() += 1;
            async { Ok(page(vec![], None)) }
        })
        .await
        .unwrap();

        assert!(nodes.is_empty());
        assert_eq!(calls.into_inner(), 1);
    }

    #[tokio::test]
    async fn test_missing_cursor_is_error() {
        let result = collect_pages(|_| async {
            Ok(Connection::<u32> {
                nodes: vec![1],
                page_info: PageInfo {
                    has_next_page: true,
                    end_cursor: None,
                },
            })
        })
        .await;

        assert!(matches!(result, Err(CrawlError::ApiError { .. })));
    }

    #[tokio::test]
    async fn test_error_aborts_pagination() {
        let result = collect_pages(|cursor| async move {
            match cursor {
                None => Ok(page(vec![1], Some("c1"))),
                Some(_) => Err(CrawlError::NotAccessible("gone".into())),
            }
        })
        .await;

        assert!(matches!(result, Err(CrawlError::NotAccessible(_))));
    }

    #[test]
    fn test_deserialize_connection() {
        let conn: Connection<String> = serde_json::from_value(serde_json::json!({
            "nodes": ["a", "b"],
            "pageInfo": {"hasNextPage": true, "endCursor": "Y3Vy"}
        }))
        .unwrap();
        assert_eq!(conn.nodes.len(), 2);
        assert!(conn.page_info.has_next_page);
        assert_eq!(conn.page_info.end_cursor.as_deref(), Some("Y3Vy"));
    }
}
