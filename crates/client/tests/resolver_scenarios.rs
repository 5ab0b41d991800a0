//! End-to-end resolver scenarios against a mocked upstream.
//!
//! The mock server plays the upstream API, the public site and the image
//! host at once; `expect(n)` pins down how many network calls each
//! scenario is allowed to make.

use serde_json::{Value, json};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use cvcache_client::{DataSource, Resolver};
use cvcache_core::cache::content_hash;
use cvcache_core::normalize::normalize;
use cvcache_core::{AppConfig, CatalogDb, ResourceType};

fn params(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
}

async fn resolver_with(server: &MockServer, configure: impl FnOnce(&mut AppConfig)) -> Resolver {
    let mut config = AppConfig {
        upstream_base_url: server.uri(),
        site_base_url: server.uri(),
        ..Default::default()
    };
    configure(&mut config);
    let db = CatalogDb::open_in_memory().await.unwrap();
    Resolver::new(&config, db).unwrap()
}

async fn resolver(server: &MockServer, api_key: Option<&str>) -> Resolver {
    resolver_with(server, |c| c.api_key = api_key.map(String::from)).await
}

fn results(body: &Option<Value>) -> &Value {
    &body.as_ref().expect("JSON body")["results"]
}

mod detail {
    use super::*;

    #[tokio::test]
    async fn test_broken_store_degrades_to_upstream() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/issue/4000-77/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status_code": 1,
                "error": "OK",
                "results": {"id": 77, "name": "Still Here", "image": {"original_url": "https://img.test/77.jpg"}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let resolver = resolver(&server, Some("k")).await;
        resolver
            .db()
            .connection()
            .call(|conn| conn.execute_batch("DROP TABLE cv_issue"))
            .await
            .unwrap();
        assert!(resolver.db().get_record(ResourceType::Issue, 77).await.is_err());

        let res = resolver.resolve("/api/issue/4000-77/", &[]).await;
        assert_eq!(res.status, 200);
        assert_eq!(res.source, DataSource::ComicvineApi);
        let body = res.json_body();
        assert_eq!(results(&body)["name"], "Still Here");
        assert_eq!(results(&body)["issue_number"], "");
    }

    #[tokio::test]
    async fn test_stored_document_gets_defaults() {
        let server = MockServer::start().await;
        let resolver = resolver(&server, None).await;
        resolver
            .db()
            .upsert_record(ResourceType::Issue, 12345, &json!({"id": 12345, "name": "X"}))
            .await
            .unwrap();

        let res = resolver.resolve("/api/issue/4000-12345", &[]).await;
        assert_eq!(res.status, 200);
        assert_eq!(res.source, DataSource::LocalDatabaseTable);

        let body = res.json_body();
        let doc = results(&body);
        assert_eq!(doc["id"], 12345);
        assert_eq!(doc["issue_number"], "");
        assert_eq!(doc["volume"], Value::Null);
    }

    #[tokio::test]
    async fn test_cold_miss_is_read_through() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/issue/4000-99999999/"))
            .and(query_param("api_key", "k"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status_code": 1,
                "error": "OK",
                "version": "1.0",
                "results": {
                    "id": 99999999,
                    "name": "Fresh",
                    "volume": {"id": 796, "name": "Batman"},
                    "image": {"original_url": "https://img.test/fresh.jpg"}
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let resolver = resolver(&server, Some("k")).await;

        let first = resolver.resolve("/api/issue/4000-99999999/", &[]).await;
        assert_eq!(first.source, DataSource::ComicvineApi);
        let first_body = first.json_body();
        assert_eq!(results(&first_body)["id"], 99999999);
        assert_eq!(results(&first_body)["issue_number"], "");

        let second = resolver.resolve("/api/issue/4000-99999999/", &[]).await;
        assert_eq!(second.source, DataSource::LocalDatabaseTable);
        let second_body = second.json_body();

        assert_eq!(results(&first_body), results(&second_body));
    }

    #[tokio::test]
    async fn test_field_list_is_stripped_upstream_and_applied_locally() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/character/4005-1699/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status_code": 1,
                "results": {
                    "id": 1699,
                    "name": "Bruce Wayne",
                    "deck": "Batman",
                    "image": {"original_url": "https://img.test/bw.jpg"}
                }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let resolver = resolver(&server, Some("k")).await;
        let res = resolver
            .resolve("/api/character/4005-1699/", &params(&[("field_list", "id,name")]))
            .await;

        let body = res.json_body();
        assert_eq!(results(&body), &json!({"id": 1699, "name": "Bruce Wayne"}));

        let requests = server.received_requests().await.unwrap();
        assert!(requests[0].url.query_pairs().all(|(k, _)| k != "field_list"));

        let stored = resolver
            .db()
            .get_record(ResourceType::Character, 1699)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored["deck"], "Batman");
    }
}

mod list {
    use super::*;

    #[tokio::test]
    async fn test_enrichment_stops_at_cap() {
        let server = MockServer::start().await;
        let cover = format!("{}/img/c.png", server.uri());

        Mock::given(method("GET"))
            .and(query_param("field_list", "id,name,image"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status_code": 1,
                "results": {"image": {"original_url": cover}}
            })))
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/img/c.png"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(vec![0x89u8, 0x50], "image/png"))
            .mount(&server)
            .await;

        let resolver = resolver_with(&server, |c| {
            c.api_key = Some("k".into());
            c.list_enrichment_cap = 2;
        })
        .await;
        for (id, appearances) in [(1, 30), (2, 20), (3, 10)] {
            let doc = json!({"id": id, "count_of_issue_appearances": appearances});
            resolver.db().upsert_record(ResourceType::Character, id, &doc).await.unwrap();
        }

        let body = resolver.resolve("/api/characters", &[]).await.json_body().unwrap();
        let items = body["results"].as_array().unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0]["image"]["original_url"], cover.as_str());
        assert_eq!(items[1]["image"]["original_url"], cover.as_str());
        assert_eq!(items[2]["id"], 3);
        assert_eq!(items[2]["image"]["original_url"], "");
        assert_eq!(items[2]["image"]["small_url"], "");
    }

    #[tokio::test]
    async fn test_relation_filter_matches_both_shapes() {
        let server = MockServer::start().await;
        let resolver = resolver(&server, None).await;
        let image = json!({"original_url": "https://img.test/i.jpg"});

        for doc in [
            json!({"id": 1, "name": "a", "volume": 796, "image": image}),
            json!({"id": 2, "name": "b", "volume": {"id": 796}, "image": image}),
            json!({"id": 3, "name": "c", "volume": {"id": 5}, "image": image}),
        ] {
            resolver.db().upsert_record(ResourceType::Issue, 0, &doc).await.unwrap();
        }

        let res = resolver
            .resolve("/api/issues/", &params(&[("filter", "volume:796")]))
            .await;
        assert_eq!(res.source, DataSource::LocalDatabaseTable);

        let body = res.json_body().unwrap();
        assert_eq!(body["number_of_total_results"], 2);
        let ids: Vec<i64> = body["results"]
            .as_array()
            .unwrap()
            .iter()
            .map(|d| d["id"].as_i64().unwrap())
            .collect();
        assert_eq!(ids, vec![1, 2]);
        for doc in body["results"].as_array().unwrap() {
            assert_eq!(doc["volume"], json!({"id": 796}));
        }
    }

    #[tokio::test]
    async fn test_page_bounds() {
        let server = MockServer::start().await;
        let resolver = resolver(&server, None).await;
        for i in 1..=5 {
            let doc = json!({"id": i, "count_of_issues": i * 10, "image": {"small_url": "https://img.test/v.jpg"}});
            resolver.db().upsert_record(ResourceType::Volume, i, &doc).await.unwrap();
        }

        let res = resolver
            .resolve("/api/volumes", &params(&[("limit", "2"), ("offset", "1")]))
            .await;
        let body = res.json_body().unwrap();

        assert_eq!(body["limit"], 2);
        assert_eq!(body["offset"], 1);
        assert_eq!(body["number_of_page_results"], 2);
        assert_eq!(body["number_of_total_results"], 5);
        assert_eq!(body["results"][0]["id"], 4);
        assert_eq!(body["results"][1]["id"], 3);
    }

    #[tokio::test]
    async fn test_publisher_allow_list() {
        let server = MockServer::start().await;
        let resolver = resolver_with(&server, |c| c.major_publishers = vec!["Marvel".into()]).await;
        let image = json!({"small_url": "https://img.test/v.jpg"});
        resolver
            .db()
            .upsert_record(ResourceType::Volume, 1, &json!({"id": 1, "publisher": {"name": "Marvel"}, "image": image}))
            .await
            .unwrap();
        resolver
            .db()
            .upsert_record(ResourceType::Volume, 2, &json!({"id": 2, "publisher": {"name": "Other"}, "image": image}))
            .await
            .unwrap();

        let body = resolver.resolve("/api/volumes", &[]).await.json_body().unwrap();
        assert_eq!(body["number_of_total_results"], 1);
        assert_eq!(body["results"][0]["id"], 1);
    }
}

mod images {
    use super::*;

    #[tokio::test]
    async fn test_volume_takes_first_issue_cover() {
        let server = MockServer::start().await;
        let cover = format!("{}/covers/1.jpg", server.uri());

        Mock::given(method("GET"))
            .and(path("/covers/1.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(vec![0xFFu8, 0xD8, 0xFF], "image/jpeg"))
            .expect(1)
            .mount(&server)
            .await;

        let resolver = resolver(&server, None).await;
        let db = resolver.db();
        db.upsert_record(
            ResourceType::Volume,
            796,
            &json!({
                "id": 796,
                "name": "Batman",
                "image": {"small_url": ""},
                "issues": [
                    {"id": 1002, "issue_number": "2"},
                    {"id": 1001, "issue_number": "1"}
                ]
            }),
        )
        .await
        .unwrap();
        db.upsert_record(
            ResourceType::Issue,
            1001,
            &json!({"id": 1001, "issue_number": "1", "image": {"original_url": cover, "small_url": cover}}),
        )
        .await
        .unwrap();

        let issue = normalize(ResourceType::Issue, db.get_record(ResourceType::Issue, 1001).await.unwrap().unwrap());

        let res = resolver.resolve("/api/volume/4050-796/", &[]).await;
        let body = res.json_body();
        assert_eq!(results(&body)["image"], issue["image"]);

        let again = resolver.resolve("/api/volume/4050-796/", &[]).await;
        let again_body = again.json_body();
        assert_eq!(results(&again_body)["image"], issue["image"]);
        assert!(db.has_image(&content_hash(&cover).unwrap()).await.unwrap());
    }

    #[tokio::test]
    async fn test_enrichment_converges() {
        let server = MockServer::start().await;
        let cover = format!("{}/img/c.png", server.uri());

        Mock::given(method("GET"))
            .and(path("/api/character/4005-7/"))
            .and(query_param("field_list", "id,name,image"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status_code": 1,
                "results": {"id": 7, "name": "C", "image": {"original_url": cover}}
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/img/c.png"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(vec![0x89u8, 0x50], "image/png"))
            .expect(1)
            .mount(&server)
            .await;

        let resolver = resolver(&server, Some("k")).await;
        resolver
            .db()
            .upsert_record(ResourceType::Character, 7, &json!({"id": 7, "name": "C"}))
            .await
            .unwrap();

        let first = resolver.resolve("/api/character/4005-7/", &[]).await.json_body();
        let second = resolver.resolve("/api/character/4005-7/", &[]).await.json_body();

        assert_eq!(results(&first)["image"]["original_url"], cover.as_str());
        assert_eq!(results(&first), results(&second));
    }

    #[tokio::test]
    async fn test_cached_images_served_from_public_url() {
        let server = MockServer::start().await;
        let cover = format!("{}/img/p.jpg", server.uri());

        Mock::given(method("GET"))
            .and(path("/api/publisher/4010-31/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status_code": 1,
                "results": {"id": 31, "image": {"thumb_url": cover}}
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/img/p.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(vec![1u8], "image/jpeg"))
            .expect(1)
            .mount(&server)
            .await;

        let resolver = resolver_with(&server, |c| {
            c.api_key = Some("k".into());
            c.public_url = Some("https://proxy.test".into());
        })
        .await;
        resolver
            .db()
            .upsert_record(ResourceType::Publisher, 31, &json!({"id": 31, "name": "Marvel"}))
            .await
            .unwrap();

        let body = resolver.resolve("/api/publisher/4010-31/", &[]).await.json_body();
        let local = format!("https://proxy.test/images/{}", content_hash(&cover).unwrap());
        assert_eq!(results(&body)["image"]["thumb_url"], local.as_str());

        let stored = resolver
            .db()
            .get_record(ResourceType::Publisher, 31)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored["image"]["thumb_url"], cover.as_str());
    }
}

mod passthrough {
    use super::*;

    #[tokio::test]
    async fn test_unknown_path_mirrors_upstream_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/totally-unknown-thing"))
            .and(query_param("format", "json"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"error": "Not Found"})))
            .expect(1)
            .mount(&server)
            .await;

        let resolver = resolver(&server, Some("k")).await;
        let res = resolver.resolve("/api/totally-unknown-thing", &[]).await;

        assert_eq!(res.status, 404);
        assert_eq!(res.source, DataSource::Passthrough);
        assert_eq!(res.json_body().unwrap()["error"], "Not Found");
    }

    #[tokio::test]
    async fn test_prefix_mismatch_is_forwarded() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/issue/4050-1/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status_code": 1, "results": {}})))
            .expect(1)
            .mount(&server)
            .await;

        let resolver = resolver(&server, Some("k")).await;
        resolver
            .db()
            .upsert_record(ResourceType::Issue, 1, &json!({"id": 1}))
            .await
            .unwrap();

        let res = resolver.resolve("/api/issue/4050-1/", &[]).await;
        assert_eq!(res.source, DataSource::Passthrough);
    }
}
