use std::{
    sync::Arc,
    time::Duration,
};

use anyhow::Result;
use test_utils::{
    router::{
        MockRouter,
        MockRouterConfig,
    },
    session::wait_for_state,
};
use tokio::sync::mpsc::{
    UnboundedReceiver,
    unbounded_channel,
};
use wamp_session::{
    core::{
        close::CloseReason,
        error::ValidationError,
        types::{
            Dictionary,
            Value,
        },
    },
    peer::{
        Call,
        ClientBuilder,
        EVENT_METADATA_KEY,
        Event,
        Invocation,
        Publish,
        Session,
        SessionConfig,
        SessionState,
        Subscription,
        procedure_fn,
        subscription_fn,
    },
};

const REALM: &str = "com.example.test";

fn collector() -> (std::sync::Arc<dyn Subscription>, UnboundedReceiver<Event>) {
    let (event_tx, event_rx) = unbounded_channel();
    let handler = subscription_fn(move |event: Event| {
        let event_tx = event_tx.clone();
        async move {
            event_tx.send(event).ok();
            Ok::<_, anyhow::Error>(())
        }
    });
    (handler, event_rx)
}

async fn next_event(event_rx: &mut UnboundedReceiver<Event>) -> Event {
    tokio::time::timeout(Duration::from_secs(5), event_rx.recv())
        .await
        .unwrap()
        .unwrap()
}

fn session_config(name: &str) -> SessionConfig {
    SessionConfig {
        name: name.to_owned(),
        ..Default::default()
    }
}

#[tokio::test]
async fn subscriber_receives_every_event_with_metadata() {
    test_utils::setup::setup_test_environment();

    let (_router, connector) = MockRouter::start(MockRouterConfig::default());
    let (handler, mut event_rx) = collector();
    let subscriber = ClientBuilder::new(REALM, Box::new(connector.clone()))
        .session_config(session_config("subscriber"))
        .subscription("foo", handler)
        .build()
        .unwrap();
    let publisher = ClientBuilder::new(REALM, Box::new(connector.clone()))
        .session_config(session_config("publisher"))
        .build()
        .unwrap();
    subscriber.start().await.unwrap();
    publisher.start().await.unwrap();

    let subscriptions = subscriber.session().subscriptions().await;
    pretty_assertions::assert_eq!(subscriptions.len(), 1);
    let subscription = *subscriptions.keys().next().unwrap();

    for _ in 0..3 {
        assert_matches::assert_matches!(
            Publish::new("foo")
                .kwarg("message", "foobar")
                .send(publisher.session())
                .await,
            Ok(None)
        );
    }

    for _ in 0..3 {
        let event = next_event(&mut event_rx).await;
        pretty_assertions::assert_eq!(event.subscription, subscription);
        pretty_assertions::assert_eq!(
            event.arguments_keyword,
            Dictionary::from_iter([
                ("message".to_owned(), Value::from("foobar")),
                (
                    EVENT_METADATA_KEY.to_owned(),
                    Value::Dictionary(Dictionary::from_iter([
                        ("topic".to_owned(), Value::from("foo")),
                        ("subscription_id".to_owned(), Value::from(subscription)),
                    ])),
                ),
            ])
        );
    }
    assert_matches::assert_matches!(event_rx.try_recv(), Err(_));
}

#[tokio::test]
async fn publish_requires_keyword_payload_only() {
    test_utils::setup::setup_test_environment();

    let (_router, connector) = MockRouter::start(MockRouterConfig::default());
    let publisher = ClientBuilder::new(REALM, Box::new(connector))
        .session_config(session_config("publisher"))
        .build()
        .unwrap();
    publisher.start().await.unwrap();

    assert_matches::assert_matches!(
        Publish::new("foo")
            .arg("foobar")
            .kwarg("message", "foobar")
            .send(publisher.session())
            .await,
        Err(err) => {
            assert_matches::assert_matches!(err.downcast_ref::<ValidationError>(), Some(_));
        }
    );
    assert_matches::assert_matches!(
        Publish::new("foo").send(publisher.session()).await,
        Err(err) => {
            assert_matches::assert_matches!(err.downcast_ref::<ValidationError>(), Some(_));
        }
    );
}

#[tokio::test]
async fn handlers_on_same_topic_share_subscription() {
    test_utils::setup::setup_test_environment();

    let (_router, connector) = MockRouter::start(MockRouterConfig::default());
    let subscriber = ClientBuilder::new(REALM, Box::new(connector.clone()))
        .session_config(session_config("subscriber"))
        .build()
        .unwrap();
    let publisher = ClientBuilder::new(REALM, Box::new(connector.clone()))
        .session_config(session_config("publisher"))
        .build()
        .unwrap();
    subscriber.start().await.unwrap();
    publisher.start().await.unwrap();

    let (first, mut first_rx) = collector();
    let (second, mut second_rx) = collector();
    let subscription = subscriber.session().subscribe("foo", first).await.unwrap();
    assert_matches::assert_matches!(
        subscriber.session().subscribe("foo", second).await,
        Ok(id) => {
            pretty_assertions::assert_eq!(id, subscription);
        }
    );

    assert_matches::assert_matches!(
        Publish::new("foo")
            .kwarg("message", "foobar")
            .acknowledge(true)
            .send(publisher.session())
            .await,
        Ok(Some(_))
    );
    let first_event = next_event(&mut first_rx).await;
    let second_event = next_event(&mut second_rx).await;
    pretty_assertions::assert_eq!(first_event, second_event);

    assert_matches::assert_matches!(subscriber.session().unsubscribe(subscription).await, Ok(()));
    assert!(subscriber.session().subscriptions().await.is_empty());

    Publish::new("foo")
        .kwarg("message", "foobar")
        .acknowledge(true)
        .send(publisher.session())
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_matches::assert_matches!(first_rx.try_recv(), Err(_));
    assert_matches::assert_matches!(second_rx.try_recv(), Err(_));
}

#[tokio::test]
async fn failing_handler_does_not_stop_delivery() {
    test_utils::setup::setup_test_environment();

    let (_router, connector) = MockRouter::start(MockRouterConfig::default());
    let (handler, mut event_rx) = collector();
    let subscriber = ClientBuilder::new(REALM, Box::new(connector.clone()))
        .session_config(session_config("subscriber"))
        .subscription(
            "foo",
            subscription_fn(|_: Event| async {
                Err::<(), _>(anyhow::Error::msg("handler failed"))
            }),
        )
        .subscription("foo", handler)
        .build()
        .unwrap();
    let publisher = ClientBuilder::new(REALM, Box::new(connector.clone()))
        .session_config(session_config("publisher"))
        .build()
        .unwrap();
    subscriber.start().await.unwrap();
    publisher.start().await.unwrap();

    for i in 0..2 {
        Publish::new("foo")
            .kwarg("count", i)
            .send(publisher.session())
            .await
            .unwrap();
    }
    for i in 0..2 {
        let event = next_event(&mut event_rx).await;
        pretty_assertions::assert_eq!(event.arguments_keyword.get("count"), Some(&Value::Integer(i)));
    }
    assert!(subscriber.session().active().await);
}

async fn say_hello(invocation: Invocation) -> Result<Value> {
    let name = invocation
        .str_argument(0, "name")
        .ok_or_else(|| ValidationError::new("name is required"))?;
    Ok(Value::from(format!("Hello {name}")))
}

#[tokio::test]
async fn event_handler_can_call_procedures() {
    test_utils::setup::setup_test_environment();

    let (_router, connector) = MockRouter::start(MockRouterConfig::default());
    let callee = ClientBuilder::new(REALM, Box::new(connector.clone()))
        .session_config(session_config("callee"))
        .procedure("say_hello", procedure_fn(say_hello))
        .build()
        .unwrap();
    let publisher = ClientBuilder::new(REALM, Box::new(connector.clone()))
        .session_config(session_config("publisher"))
        .build()
        .unwrap();
    callee.start().await.unwrap();
    publisher.start().await.unwrap();

    let subscriber = Arc::new(
        Session::new(
            SessionConfig {
                call_timeout: Duration::from_secs(2),
                ..session_config("subscriber")
            },
            Box::new(connector.clone()),
        )
        .unwrap(),
    );
    subscriber.begin(REALM).await.unwrap();

    let (result_tx, mut result_rx) = unbounded_channel();
    let session = Arc::downgrade(&subscriber);
    let handler = subscription_fn(move |event: Event| {
        let session = session.clone();
        let result_tx = result_tx.clone();
        async move {
            let session = session
                .upgrade()
                .ok_or_else(|| anyhow::Error::msg("session is gone"))?;
            let name = event
                .arguments_keyword
                .get("name")
                .cloned()
                .unwrap_or_default();
            let result = Call::new("say_hello").arg(name).send(&session).await;
            result_tx.send(result.map_err(|err| format!("{err:#}"))).ok();
            Ok::<_, anyhow::Error>(())
        }
    });
    subscriber.subscribe("foo", handler).await.unwrap();

    for name in ["Simon", "Anna"] {
        Publish::new("foo")
            .kwarg("name", name)
            .send(publisher.session())
            .await
            .unwrap();
    }
    for name in ["Simon", "Anna"] {
        let result = tokio::time::timeout(Duration::from_secs(5), result_rx.recv())
            .await
            .unwrap()
            .unwrap();
        pretty_assertions::assert_eq!(result, Ok(Value::from(format!("Hello {name}"))));
    }

    subscriber.end(CloseReason::Normal).await.unwrap();
}

#[tokio::test]
async fn event_handler_can_end_session() {
    test_utils::setup::setup_test_environment();

    let (_router, connector) = MockRouter::start(MockRouterConfig::default());
    let publisher = ClientBuilder::new(REALM, Box::new(connector.clone()))
        .session_config(session_config("publisher"))
        .build()
        .unwrap();
    publisher.start().await.unwrap();

    let subscriber = Arc::new(
        Session::new(session_config("subscriber"), Box::new(connector.clone())).unwrap(),
    );
    subscriber.begin(REALM).await.unwrap();

    let (result_tx, mut result_rx) = unbounded_channel();
    let session = Arc::downgrade(&subscriber);
    let handler = subscription_fn(move |_: Event| {
        let session = session.clone();
        let result_tx = result_tx.clone();
        async move {
            let session = session
                .upgrade()
                .ok_or_else(|| anyhow::Error::msg("session is gone"))?;
            let result = session.end(CloseReason::Normal).await;
            result_tx.send(result.map_err(|err| format!("{err:#}"))).ok();
            Ok::<_, anyhow::Error>(())
        }
    });
    subscriber.subscribe("foo", handler).await.unwrap();

    Publish::new("foo")
        .kwarg("message", "leave")
        .send(publisher.session())
        .await
        .unwrap();
    let result = tokio::time::timeout(Duration::from_secs(5), result_rx.recv())
        .await
        .unwrap()
        .unwrap();
    pretty_assertions::assert_eq!(result, Ok(()));
    wait_for_state(&subscriber, SessionState::Disconnected).await;
}
