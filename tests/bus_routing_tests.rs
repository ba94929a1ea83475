//! Routing tests for the message bus
//!
//! Direct, role fan-out and broadcast delivery observed through mailbox probes.

use serde_json::json;
use switchyard_core::*;
use switchyard_test_utils::*;

fn note(from: &str) -> Message {
    Message::new(from, AgentRole::SystemMonitor, MessageType::Notification, payload(json!({"n": 1})))
}

fn probes(bus: &MessageBus) -> Vec<MailboxProbe> {
    vec![
        MailboxProbe::subscribed(bus, "data_collector_1", AgentRole::DataCollector),
        MailboxProbe::subscribed(bus, "data_collector_2", AgentRole::DataCollector),
        MailboxProbe::subscribed(bus, "data_collector_3", AgentRole::DataCollector),
        MailboxProbe::subscribed(bus, "model_trainer_4", AgentRole::ModelTrainer),
        MailboxProbe::subscribed(bus, "coordinator_5", AgentRole::Coordinator),
    ]
}

#[test]
fn test_direct_message_reaches_only_its_recipient() {
    println!("🧪 Testing Direct Routing");

    let bus = MessageBus::new();
    let mut probes = probes(&bus);

    let message = note("system_monitor_9").to_agent("data_collector_2");
    assert_eq!(bus.publish(message.clone()), 1);

    for probe in probes.iter_mut() {
        let received = probe.drain();
        if probe.id() == "data_collector_2" {
            assert_eq!(received, vec![message.clone()]);
        } else {
            assert!(received.is_empty(), "{} should not receive a direct message", probe.id());
        }
    }

    println!("✅ Only data_collector_2 received the message");
}

#[test]
fn test_role_fan_out_follows_subscription_order() {
    println!("🧪 Testing Role Fan-out");

    let bus = MessageBus::new();
    let mut probes = probes(&bus);

    let message = note("coordinator_5").to_role(AgentRole::DataCollector);
    assert_eq!(bus.publish(message.clone()), 3);
    assert_eq!(
        bus.agents_in_role(AgentRole::DataCollector),
        vec!["data_collector_1", "data_collector_2", "data_collector_3"]
    );

    let counts: Vec<(String, usize)> = probes
        .iter_mut()
        .map(|probe| (probe.id().to_string(), probe.drain().len()))
        .collect();
    let collectors: Vec<(&str, usize)> = counts[..3].iter().map(|(id, n)| (id.as_str(), *n)).collect();
    let others: Vec<(&str, usize)> = counts[3..].iter().map(|(id, n)| (id.as_str(), *n)).collect();
    TestAssertions::delivered_counts(&collectors, 1);
    TestAssertions::delivered_counts(&others, 0);

    println!("✅ Every collector got exactly one copy; other roles got none");
}

#[test]
fn test_broadcast_reaches_every_subscriber() {
    let bus = MessageBus::new();
    let mut probes = probes(&bus);

    assert_eq!(bus.publish(note("system_monitor_9")), 5);
    for probe in probes.iter_mut() {
        assert_eq!(probe.drain().len(), 1, "{} missed the broadcast", probe.id());
    }
}

#[test]
fn test_unknown_recipient_and_empty_role_are_silent() {
    let bus = MessageBus::new();
    let mut probes = probes(&bus);

    assert_eq!(bus.publish(note("coordinator_5").to_agent("data_collector_42")), 0);
    assert_eq!(bus.publish(note("coordinator_5").to_role(AgentRole::FeedbackAnalyzer)), 0);
    assert!(probes.iter_mut().all(|probe| probe.drain().is_empty()));

    let stats = bus.stats();
    assert_eq!(stats.total_published, 2);
    assert_eq!(stats.total_delivered, 0);
    assert_eq!(stats.dropped_deliveries, 1);
    assert_eq!(stats.subscribed_agents, 5);
}

#[test]
fn test_unsubscribed_agent_stops_receiving() {
    let bus = MessageBus::new();
    let mut probes = probes(&bus);

    bus.unsubscribe("data_collector_1");
    bus.unsubscribe("not_subscribed");

    assert_eq!(bus.publish(note("coordinator_5").to_role(AgentRole::DataCollector)), 2);
    assert_eq!(bus.publish(note("coordinator_5").to_agent("data_collector_1")), 0);
    assert!(probes[0].drain().is_empty());
    assert_eq!(probes[1].drain().len(), 1);
}

#[test]
fn test_repeated_subscription_delivers_once() {
    let bus = MessageBus::new();
    let mut probe = MailboxProbe::subscribed(&bus, "model_trainer_1", AgentRole::ModelTrainer);
    bus.subscribe(probe.handle());
    bus.subscribe(probe.handle());

    assert_eq!(bus.publish(note("coordinator_2").to_role(AgentRole::ModelTrainer)), 1);
    assert_eq!(bus.publish(note("coordinator_2")), 1);
    assert_eq!(probe.drain().len(), 2);
}

#[test]
fn test_closed_inbox_is_isolated() {
    let bus = MessageBus::new();
    let gone = MailboxProbe::subscribed(&bus, "data_collector_1", AgentRole::DataCollector);
    let mut alive = MailboxProbe::subscribed(&bus, "data_collector_2", AgentRole::DataCollector);
    drop(gone);

    assert_eq!(bus.publish(note("coordinator_3").to_role(AgentRole::DataCollector)), 1);
    assert_eq!(alive.drain().len(), 1);
}
