//! Broker-backed round trips; run against a live cluster with
//! `cargo test --features integration_test`. The broker list comes from
//! `KAFKA_BROKERS` (default `localhost:9092`).
#![cfg(feature = "integration_test")]

use std::collections::HashSet;
use std::time::Duration;

use bytes::Bytes;
use futures::StreamExt;

use franz::{
    ClientBuilder, ConsumerBuilder, FetchOffset, KafkaAdmin, KafkaCode, NewTopic,
    ProducerBuilder, ProducerRecord, RequiredAcks,
};

fn brokers() -> Vec<String> {
    std::env::var("KAFKA_BROKERS")
        .unwrap_or_else(|_| "localhost:9092".to_owned())
        .split(',')
        .map(str::to_owned)
        .collect()
}

fn unique(name: &str) -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .subsec_nanos();
    format!("{}-{}-{}", name, std::process::id(), nanos)
}

#[tokio::test]
async fn create_then_delete_topic() {
    let client = ClientBuilder::from_hosts(brokers()).build().unwrap();
    let admin = KafkaAdmin::new(client);

    let topic = unique("t");
    let created = admin
        .create_topics(vec![NewTopic::new(topic.clone(), 3, 1)], 30_000, false)
        .await
        .unwrap();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].name, topic);

    // creating it again is not idempotent
    let err = admin
        .create_topics(vec![NewTopic::new(topic.clone(), 3, 1)], 30_000, false)
        .await
        .unwrap_err();
    assert_eq!(err.kafka_code(), Some(KafkaCode::TopicAlreadyExists));

    let listed = admin.list_topics().await.unwrap();
    let entry = listed.iter().find(|listing| listing.name == topic).unwrap();
    assert_eq!(entry.partitions_count, 3);

    admin.delete_topics(vec![topic], 30_000).await.unwrap();
    admin.close();
}

#[tokio::test]
async fn produce_then_consume_one_message() {
    let topic = unique("t");
    let group = unique("g");

    let client = ClientBuilder::from_hosts(brokers()).build().unwrap();
    let admin = KafkaAdmin::new(client.clone());
    admin
        .create_topics(vec![NewTopic::new(topic.clone(), 1, 1)], 30_000, false)
        .await
        .unwrap();

    let producer = ProducerBuilder::from_client(client.clone())
        .with_required_acks(RequiredAcks::All)
        .build()
        .unwrap();
    let metadata = producer
        .send(ProducerRecord::from_key_value(topic.clone(), "k", "v"))
        .await
        .unwrap();
    assert_eq!(metadata.offset, 0);
    producer.close().await;

    let consumer = ConsumerBuilder::from_client(client.clone())
        .with_group_id(group.clone())
        .with_mode(FetchOffset::Earliest)
        .with_autocommit(false)
        .build()
        .unwrap();
    consumer.join_group([topic.clone()]).await.unwrap();

    let mut stream = consumer.consume();
    let message = tokio::time::timeout(Duration::from_secs(30), stream.next())
        .await
        .expect("a message within 30s")
        .expect("stream open")
        .unwrap();
    assert_eq!(message.topic_name, topic);
    assert_eq!(message.offset, 0);
    assert_eq!(message.value, Some(Bytes::from_static(b"v")));

    consumer.commit_message(&message).await.unwrap();
    consumer.close().await;

    // a restart of the same group sees nothing before the committed mark
    let consumer = ConsumerBuilder::from_client(client)
        .with_group_id(group)
        .with_mode(FetchOffset::Committed)
        .build()
        .unwrap();
    consumer.join_group([topic]).await.unwrap();
    let mut stream = consumer.consume();
    let nothing = tokio::time::timeout(Duration::from_secs(5), stream.next()).await;
    assert!(nothing.is_err(), "expected no redelivery");
    consumer.close().await;
}

#[tokio::test]
async fn rebalance_hands_all_partitions_to_the_survivor() {
    let t1 = unique("t1");
    let t2 = unique("t2");
    let group = unique("g");

    let client = ClientBuilder::from_hosts(brokers()).build().unwrap();
    let admin = KafkaAdmin::new(client.clone());
    admin
        .create_topics(
            vec![NewTopic::new(t1.clone(), 3, 1), NewTopic::new(t2.clone(), 3, 1)],
            30_000,
            false,
        )
        .await
        .unwrap();

    let c1 = ConsumerBuilder::from_client(client.clone())
        .with_group_id(group.clone())
        .with_mode(FetchOffset::Earliest)
        .build()
        .unwrap();
    c1.join_group([t1.clone(), t2.clone()]).await.unwrap();

    let c2 = ConsumerBuilder::from_client(client.clone())
        .with_group_id(group.clone())
        .with_mode(FetchOffset::Earliest)
        .build()
        .unwrap();
    c2.join_group([t1.clone(), t2.clone()]).await.unwrap();

    // c1's next heartbeat rejoins; give both a moment to settle
    let _s1 = c1.consume();
    let _s2 = c2.consume();
    tokio::time::sleep(Duration::from_secs(10)).await;

    let a1: HashSet<_> = c1.assignment().into_iter().collect();
    let a2: HashSet<_> = c2.assignment().into_iter().collect();
    assert_eq!(a1.intersection(&a2).count(), 0);
    assert_eq!(a1.union(&a2).count(), 6);

    c1.close().await;
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(c2.assignment().len(), 6);
    c2.close().await;
}

#[tokio::test]
async fn transactional_commit_is_visible_to_read_committed() {
    let topic = unique("t");
    let client = ClientBuilder::from_hosts(brokers()).build().unwrap();
    let admin = KafkaAdmin::new(client.clone());
    admin
        .create_topics(vec![NewTopic::new(topic.clone(), 2, 1)], 30_000, false)
        .await
        .unwrap();

    let producer = ProducerBuilder::from_client(client.clone())
        .with_transactional_id(unique("txn"))
        .build()
        .unwrap();

    producer.begin_transaction().await.unwrap();
    producer
        .send(ProducerRecord::from_value(topic.clone(), "a").with_partition(0))
        .await
        .unwrap();
    producer
        .send(ProducerRecord::from_value(topic.clone(), "b").with_partition(1))
        .await
        .unwrap();
    producer.commit_transaction().await.unwrap();
    producer.close().await;

    let consumer = ConsumerBuilder::from_client(client)
        .with_group_id(unique("g"))
        .with_mode(FetchOffset::Earliest)
        .with_isolation(franz::IsolationLevel::ReadCommitted)
        .build()
        .unwrap();
    consumer.join_group([topic]).await.unwrap();

    let mut stream = consumer.consume();
    let mut seen = 0;
    while seen < 2 {
        let message = tokio::time::timeout(Duration::from_secs(30), stream.next())
            .await
            .expect("messages within 30s")
            .expect("stream open")
            .unwrap();
        seen += 1;
        assert!(matches!(message.value.as_deref(), Some(b"a") | Some(b"b")));
    }
    consumer.close().await;
}
