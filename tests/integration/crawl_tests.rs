//! Integration tests for the crawler
//!
//! These tests use wiremock to create mock HTTP servers and test
//! the full crawl cycle end-to-end.

use arachni_spider::{crawl, CrawlConfig, Spider, SpiderError};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use std::io::Write;
use wiremock::matchers::{header, header_exists, header_regex, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// HTML page linking to each of `links`
fn page_with_links(links: &[&str]) -> ResponseTemplate {
    let anchors: String = links
        .iter()
        .map(|link| format!(r#"<a href="{}">link</a>"#, link))
        .collect();
    ResponseTemplate::new(200).set_body_raw(
        format!("<html><body>{}</body></html>", anchors),
        "text/html",
    )
}

async fn mount_page(server: &MockServer, route: &str, links: &[&str]) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(page_with_links(links))
        .mount(server)
        .await;
}

/// Mounts a page that must be requested exactly `times` times
async fn mount_page_expect(server: &MockServer, route: &str, links: &[&str], times: u64) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(page_with_links(links))
        .expect(times)
        .mount(server)
        .await;
}

fn url(server: &MockServer, route: &str) -> String {
    format!("{}{}", server.uri(), route)
}

fn test_config() -> CrawlConfig {
    CrawlConfig {
        threads: 2,
        request_timeout: 2_000,
        ..CrawlConfig::default()
    }
}

fn as_set(sitemap: &[String]) -> HashSet<String> {
    sitemap.iter().cloned().collect()
}

/// Small site used by several tests:
/// `/` -> `/a`, `/b`; `/a` -> `/b`, `/c`; `/b` -> `/`; `/c` -> (none)
async fn mount_small_site(server: &MockServer) {
    mount_page(server, "/", &["/a", "/b"]).await;
    mount_page(server, "/a", &["/b", "c"]).await;
    mount_page(server, "/b", &["/"]).await;
    mount_page(server, "/c", &[]).await;
}

#[tokio::test]
async fn test_full_crawl_visits_each_page_once() {
    let server = MockServer::start().await;

    // Every form of the same link must collapse into one request
    mount_page_expect(&server, "/", &["/a", "/a#top", "/a?", "./a", "/"], 1).await;
    mount_page_expect(&server, "/a", &["/b", "/", "/a"], 1).await;
    mount_page_expect(&server, "/b", &["/a#section", "/b"], 1).await;

    let sitemap = crawl(&server.uri(), test_config()).await.unwrap();

    assert_eq!(sitemap.len(), 3);
    assert_eq!(
        as_set(&sitemap),
        as_set(&[url(&server, "/"), url(&server, "/a"), url(&server, "/b")])
    );
}

#[tokio::test]
async fn test_single_worker_sitemap_order() {
    let server = MockServer::start().await;
    mount_small_site(&server).await;

    let config = CrawlConfig {
        threads: 1,
        ..test_config()
    };
    let sitemap = crawl(&server.uri(), config).await.unwrap();

    // Breadth-first: depth 0, then depth 1 in discovery order, then depth 2
    assert_eq!(
        sitemap,
        vec![
            url(&server, "/"),
            url(&server, "/a"),
            url(&server, "/b"),
            url(&server, "/c"),
        ]
    );
}

#[tokio::test]
async fn test_depth_limit() {
    let server = MockServer::start().await;
    mount_page(&server, "/", &["/a"]).await;
    mount_page(&server, "/a", &["/b"]).await;
    mount_page_expect(&server, "/b", &[], 0).await;

    let config = CrawlConfig {
        depth_limit: Some(1),
        ..test_config()
    };
    let sitemap = crawl(&server.uri(), config).await.unwrap();

    assert_eq!(
        as_set(&sitemap),
        as_set(&[url(&server, "/"), url(&server, "/a")])
    );
}

#[tokio::test]
async fn test_depth_is_parent_plus_one() {
    let server = MockServer::start().await;
    mount_small_site(&server).await;

    let depths = Arc::new(Mutex::new(BTreeMap::new()));
    let recorded = Arc::clone(&depths);
    let sitemap = Spider::new(test_config())
        .unwrap()
        .on_every_page(move |page| {
            recorded
                .lock()
                .unwrap()
                .insert(page.url.path().to_string(), page.depth);
            Ok(())
        })
        .run(&server.uri())
        .await
        .unwrap();

    assert_eq!(sitemap.len(), 4);
    let depths = depths.lock().unwrap();
    assert_eq!(depths["/"], 0);
    assert_eq!(depths["/a"], 1);
    assert_eq!(depths["/b"], 1);
    assert_eq!(depths["/c"], 2);
}

#[tokio::test]
async fn test_link_count_limit_of_one_returns_only_seed() {
    let server = MockServer::start().await;
    mount_page(&server, "/", &["/a", "/b"]).await;
    mount_page_expect(&server, "/a", &[], 0).await;
    mount_page_expect(&server, "/b", &[], 0).await;

    let config = CrawlConfig {
        link_count_limit: Some(1),
        ..test_config()
    };
    let sitemap = crawl(&server.uri(), config).await.unwrap();

    assert_eq!(sitemap, vec![url(&server, "/")]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_link_count_limit_never_exceeded() {
    let server = MockServer::start().await;
    let links: Vec<String> = (0..20).map(|i| format!("/page/{}", i)).collect();
    let link_refs: Vec<&str> = links.iter().map(String::as_str).collect();
    mount_page(&server, "/", &link_refs).await;
    for link in &links {
        mount_page(&server, link, &link_refs).await;
    }

    let config = CrawlConfig {
        threads: 8,
        link_count_limit: Some(5),
        ..test_config()
    };
    let handled = Arc::new(Mutex::new(0));
    let counter = Arc::clone(&handled);
    let sitemap = Spider::new(config)
        .unwrap()
        .with_handler(move |_, _, _| *counter.lock().unwrap() += 1)
        .run(&server.uri())
        .await
        .unwrap();

    assert_eq!(sitemap.len(), 5);
    assert_eq!(*handled.lock().unwrap(), 5);
}

#[tokio::test]
async fn test_exclude_pattern() {
    let server = MockServer::start().await;
    mount_page(&server, "/", &["/admin", "/admin/users", "/public"]).await;
    mount_page(&server, "/public", &[]).await;
    mount_page_expect(&server, "/admin", &[], 0).await;
    mount_page_expect(&server, "/admin/users", &[], 0).await;

    let config = CrawlConfig {
        exclude: vec!["/admin".to_string()],
        ..test_config()
    };
    let sitemap = crawl(&server.uri(), config).await.unwrap();

    assert_eq!(
        as_set(&sitemap),
        as_set(&[url(&server, "/"), url(&server, "/public")])
    );
}

#[tokio::test]
async fn test_include_pattern() {
    let server = MockServer::start().await;
    mount_page(&server, "/docs/", &["/docs/intro", "/blog/post"]).await;
    mount_page(&server, "/docs/intro", &[]).await;
    mount_page_expect(&server, "/blog/post", &[], 0).await;

    let config = CrawlConfig {
        include: vec!["/docs/".to_string()],
        ..test_config()
    };
    let sitemap = crawl(&url(&server, "/docs/"), config).await.unwrap();

    assert_eq!(
        as_set(&sitemap),
        as_set(&[url(&server, "/docs/"), url(&server, "/docs/intro")])
    );
}

#[tokio::test]
async fn test_off_site_links_not_followed() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        "/",
        &["http://other.invalid/", "mailto:someone@example.com", "/local"],
    )
    .await;
    mount_page(&server, "/local", &[]).await;

    let sitemap = crawl(&server.uri(), test_config()).await.unwrap();

    assert_eq!(
        as_set(&sitemap),
        as_set(&[url(&server, "/"), url(&server, "/local")])
    );
}

#[tokio::test]
async fn test_broken_page_does_not_stop_crawl() {
    let server = MockServer::start().await;
    mount_page(&server, "/", &["/broken", "/ok"]).await;
    mount_page(&server, "/ok", &[]).await;
    Mock::given(method("GET"))
        .and(path("/broken"))
        .respond_with(page_with_links(&["/never"]).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;
    mount_page_expect(&server, "/never", &[], 0).await;

    let config = CrawlConfig {
        request_timeout: 300,
        ..test_config()
    };
    let sitemap = crawl(&server.uri(), config).await.unwrap();

    assert_eq!(
        as_set(&sitemap),
        as_set(&[url(&server, "/"), url(&server, "/ok")])
    );
}

#[tokio::test]
async fn test_not_found_pages_are_delivered() {
    let server = MockServer::start().await;
    mount_page(&server, "/", &["/missing"]).await;

    let sitemap = crawl(&server.uri(), test_config()).await.unwrap();

    assert!(sitemap.contains(&url(&server, "/missing")));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_thread_count_does_not_change_sitemap() {
    let server = MockServer::start().await;
    mount_page(&server, "/", &["/1", "/2", "/3"]).await;
    for i in 1..=3 {
        let children: Vec<String> = (1..=3).map(|j| format!("/{}/{}", i, j)).collect();
        let children: Vec<&str> = children.iter().map(String::as_str).collect();
        mount_page(&server, &format!("/{}", i), &children).await;
        for child in children {
            mount_page(&server, child, &["/", "/1", "/2/2"]).await;
        }
    }

    let single = crawl(
        &server.uri(),
        CrawlConfig {
            threads: 1,
            ..test_config()
        },
    )
    .await
    .unwrap();
    let many = crawl(
        &server.uri(),
        CrawlConfig {
            threads: 8,
            ..test_config()
        },
    )
    .await
    .unwrap();

    assert_eq!(single.len(), 13);
    assert_eq!(as_set(&single), as_set(&many));
    assert_eq!(many.len(), 13);
}

#[tokio::test]
async fn test_robots_txt_disallow() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /private\n"),
        )
        .expect(1)
        .mount(&server)
        .await;
    mount_page(&server, "/", &["/private/data", "/public"]).await;
    mount_page(&server, "/public", &[]).await;
    mount_page_expect(&server, "/private/data", &[], 0).await;

    let config = CrawlConfig {
        obey_robots_txt: true,
        ..test_config()
    };
    let sitemap = crawl(&server.uri(), config).await.unwrap();

    assert_eq!(
        as_set(&sitemap),
        as_set(&[url(&server, "/"), url(&server, "/public")])
    );
}

#[tokio::test]
async fn test_robots_txt_ignored_when_not_obeyed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/robots.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_string("User-agent: *\nDisallow: /\n"))
        .expect(0)
        .mount(&server)
        .await;
    mount_page(&server, "/", &["/private"]).await;
    mount_page(&server, "/private", &[]).await;

    let sitemap = crawl(&server.uri(), test_config()).await.unwrap();
    assert_eq!(sitemap.len(), 2);
}

#[tokio::test]
async fn test_missing_robots_txt_allows_all() {
    let server = MockServer::start().await;
    mount_page(&server, "/", &["/private"]).await;
    mount_page(&server, "/private", &[]).await;

    let config = CrawlConfig {
        obey_robots_txt: true,
        ..test_config()
    };
    let sitemap = crawl(&server.uri(), config).await.unwrap();

    assert_eq!(sitemap.len(), 2);
}

#[tokio::test]
async fn test_cookies_sent_and_accepted() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .and(header("cookie", "auth=1"))
        .respond_with(page_with_links(&["/account"]).insert_header("set-cookie", "session=abc; Path=/"))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/account"))
        .and(header_regex("cookie", "(^|; )auth=1(;|$)"))
        .and(header_regex("cookie", "(^|; )session=abc(;|$)"))
        .respond_with(page_with_links(&[]))
        .expect(1)
        .mount(&server)
        .await;

    let mut cookies = BTreeMap::new();
    cookies.insert("auth".to_string(), "1".to_string());
    let config = CrawlConfig {
        threads: 1,
        cookies,
        ..test_config()
    };

    let received = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&received);
    let sitemap = Spider::new(config)
        .unwrap()
        .with_handler(move |url, _, set_cookie| {
            sink.lock()
                .unwrap()
                .push((url.to_string(), set_cookie.to_string()));
        })
        .run(&server.uri())
        .await
        .unwrap();

    assert_eq!(sitemap.len(), 2);
    let received = received.lock().unwrap();
    assert_eq!(received[0].1, "session=abc; Path=/");
    assert_eq!(received[1].1, "");
}

#[tokio::test]
async fn test_cookies_not_accepted() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(page_with_links(&["/next"]).insert_header("set-cookie", "session=abc"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/next"))
        .and(header_exists("cookie"))
        .respond_with(page_with_links(&[]))
        .expect(0)
        .mount(&server)
        .await;
    mount_page(&server, "/next", &[]).await;

    let config = CrawlConfig {
        accept_cookies: false,
        ..test_config()
    };
    let sitemap = crawl(&server.uri(), config).await.unwrap();
    assert_eq!(sitemap.len(), 2);
}

#[tokio::test]
async fn test_expired_cookie_not_resent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(page_with_links(&["/logout"]).insert_header("set-cookie", "sid=abc; Path=/"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/logout"))
        .and(header("cookie", "sid=abc"))
        .respond_with(page_with_links(&["/after"]).insert_header(
            "set-cookie",
            "sid=deleted; Path=/; Expires=Thu, 01 Jan 1970 00:00:00 GMT",
        ))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/after"))
        .and(header_exists("cookie"))
        .respond_with(page_with_links(&[]))
        .expect(0)
        .mount(&server)
        .await;
    mount_page(&server, "/after", &[]).await;

    let config = CrawlConfig {
        threads: 1,
        ..test_config()
    };
    let sitemap = crawl(&server.uri(), config).await.unwrap();
    assert_eq!(sitemap.len(), 3);
}

#[tokio::test]
async fn test_cookie_jar_file_cookies_sent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .and(header("cookie", "remembered=yes"))
        .respond_with(page_with_links(&[]))
        .expect(1)
        .mount(&server)
        .await;

    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "# Netscape HTTP Cookie File").unwrap();
    writeln!(file, "127.0.0.1\tFALSE\t/\tFALSE\t0\tremembered\tyes").unwrap();
    file.flush().unwrap();

    let config = CrawlConfig {
        cookie_jar: Some(file.path().to_path_buf()),
        ..test_config()
    };
    let sitemap = crawl(&server.uri(), config).await.unwrap();
    assert_eq!(sitemap, vec![url(&server, "/")]);
}

#[tokio::test]
async fn test_unreadable_cookie_jar_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let config = CrawlConfig {
        cookie_jar: Some(dir.path().join("cookies.txt")),
        ..test_config()
    };
    let result = crawl("http://127.0.0.1/", config).await;
    assert!(matches!(result, Err(SpiderError::Config(_))));
}

#[tokio::test]
async fn test_redirect_into_excluded_path_not_fetched() {
    let server = MockServer::start().await;
    mount_page(&server, "/", &["/go", "/ok"]).await;
    mount_page(&server, "/ok", &[]).await;
    Mock::given(method("GET"))
        .and(path("/go"))
        .respond_with(ResponseTemplate::new(302).insert_header("location", "/admin/secret"))
        .mount(&server)
        .await;
    mount_page_expect(&server, "/admin/secret", &[], 0).await;

    let config = CrawlConfig {
        exclude: vec!["/admin".to_string()],
        ..test_config()
    };
    let sitemap = crawl(&server.uri(), config).await.unwrap();

    assert_eq!(
        as_set(&sitemap),
        as_set(&[url(&server, "/"), url(&server, "/ok")])
    );
}

#[tokio::test]
async fn test_redirect_limit_exceeded() {
    let server = MockServer::start().await;
    mount_page(&server, "/", &["/r1", "/ok"]).await;
    mount_page(&server, "/ok", &[]).await;
    for (from, to) in [("/r1", "/r2"), ("/r2", "/r3")] {
        Mock::given(method("GET"))
            .and(path(from))
            .respond_with(ResponseTemplate::new(302).insert_header("location", to))
            .mount(&server)
            .await;
    }
    mount_page_expect(&server, "/r3", &[], 0).await;

    let config = CrawlConfig {
        redirect_limit: Some(1),
        ..test_config()
    };
    let sitemap = crawl(&server.uri(), config).await.unwrap();

    assert_eq!(
        as_set(&sitemap),
        as_set(&[url(&server, "/"), url(&server, "/ok")])
    );
}

#[tokio::test]
async fn test_redirected_page_listed_under_scheduled_url() {
    let server = MockServer::start().await;
    mount_page(&server, "/", &["/old"]).await;
    Mock::given(method("GET"))
        .and(path("/old"))
        .respond_with(ResponseTemplate::new(301).insert_header("location", "/new/"))
        .mount(&server)
        .await;
    mount_page(&server, "/new/", &["child"]).await;
    mount_page(&server, "/new/child", &[]).await;

    let sitemap = crawl(&server.uri(), test_config()).await.unwrap();

    // Links on the redirected page resolve against the final URL
    assert_eq!(
        as_set(&sitemap),
        as_set(&[
            url(&server, "/"),
            url(&server, "/old"),
            url(&server, "/new/child")
        ])
    );
}

#[tokio::test]
async fn test_hook_failures_are_isolated() {
    let server = MockServer::start().await;
    mount_small_site(&server).await;

    let order = Arc::new(Mutex::new(Vec::new()));
    let first = Arc::clone(&order);
    let last = Arc::clone(&order);

    let config = CrawlConfig {
        threads: 1,
        ..test_config()
    };
    let sitemap = Spider::new(config)
        .unwrap()
        .on_every_page(move |page| {
            first.lock().unwrap().push(format!("first {}", page.url.path()));
            Ok(())
        })
        .on_every_page(|page| Err(format!("cannot handle {}", page.url).into()))
        .on_every_page(|page| {
            if page.url.path() == "/a" {
                panic!("hook panic");
            }
            Ok(())
        })
        .on_every_page(move |page| {
            last.lock().unwrap().push(format!("last {}", page.url.path()));
            Ok(())
        })
        .run(&server.uri())
        .await
        .unwrap();

    assert_eq!(sitemap.len(), 4);
    let order = order.lock().unwrap();
    assert_eq!(order.len(), 8);
    assert_eq!(order[0], "first /");
    assert_eq!(order[1], "last /");
    assert_eq!(order[2], "first /a");
    assert_eq!(order[3], "last /a");
}

#[tokio::test]
async fn test_discard_page_bodies() {
    let server = MockServer::start().await;
    mount_page(&server, "/", &["/a"]).await;
    mount_page(&server, "/a", &[]).await;

    let config = CrawlConfig {
        discard_page_bodies: true,
        ..test_config()
    };

    let hook_bodies = Arc::new(Mutex::new(Vec::new()));
    let handler_bodies = Arc::new(Mutex::new(Vec::new()));
    let hooks_sink = Arc::clone(&hook_bodies);
    let handler_sink = Arc::clone(&handler_bodies);

    let sitemap = Spider::new(config)
        .unwrap()
        .with_handler(move |_, body, _| handler_sink.lock().unwrap().push(body.len()))
        .on_every_page(move |page| {
            hooks_sink.lock().unwrap().push(page.body.clone());
            Ok(())
        })
        .run(&server.uri())
        .await
        .unwrap();

    // Links are still followed from the discarded bodies
    assert_eq!(sitemap.len(), 2);
    assert!(hook_bodies.lock().unwrap().iter().all(Option::is_none));
    assert!(handler_bodies.lock().unwrap().iter().all(|len| *len > 0));
}

#[tokio::test]
async fn test_cancellation_returns_partial_sitemap() {
    let server = MockServer::start().await;
    let chain: Vec<String> = (0..10).map(|i| format!("/step/{}", i)).collect();
    mount_page(&server, "/", &[chain[0].as_str()]).await;
    for window in chain.windows(2) {
        mount_page(&server, &window[0], &[window[1].as_str()]).await;
    }
    mount_page(&server, &chain[9], &[]).await;

    let config = CrawlConfig {
        threads: 1,
        ..test_config()
    };
    let spider = Spider::new(config).unwrap();
    let token = spider.cancellation_token();

    let sitemap = spider
        .with_handler(move |_, _, _| token.cancel())
        .run(&server.uri())
        .await
        .unwrap();

    assert!(!sitemap.is_empty());
    assert!(sitemap.len() <= 2);
    assert_eq!(sitemap[0], url(&server, "/"));
}

#[tokio::test]
async fn test_invalid_seed_is_an_error() {
    let result = crawl("not a url", test_config()).await;
    assert!(matches!(result, Err(SpiderError::InvalidSeed { .. })));
}

#[tokio::test]
async fn test_zero_link_count_limit_is_an_error() {
    let config = CrawlConfig {
        link_count_limit: Some(0),
        ..test_config()
    };
    let result = crawl("http://127.0.0.1/", config).await;
    assert!(matches!(result, Err(SpiderError::Config(_))));
}

#[tokio::test]
async fn test_invalid_config_is_an_error() {
    let config = CrawlConfig {
        exclude: vec!["(unclosed".to_string()],
        ..test_config()
    };
    let result = crawl("http://127.0.0.1/", config).await;
    assert!(matches!(result, Err(SpiderError::Config(_))));
}
