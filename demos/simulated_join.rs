use treenet::core::{Address, Config, GroupId};
use treenet::network::sim::SimNode;
use treenet::network::{DiscoveryEngine, JoinOutcome};
use treenet::protocol::MAX_FRAME_SIZE;

fn node(address: Address, group: GroupId, is_hub: bool) -> (SimNode, DiscoveryEngine) {
    let sim = SimNode::new(address, group);
    let engine = DiscoveryEngine::new(Config::for_node(address, is_hub), sim.peripherals(address.0 as u64))
        .expect("valid node configuration");
    (sim, engine)
}

/// Delivers every frame `from` transmitted to `to`
fn relay(from: &SimNode, to: &SimNode) {
    for frame in from.radio.take_sent() {
        to.radio.queue_frame(&frame, -60);
    }
}

fn main() {
    tracing_subscriber::fmt::init();

    let hub_addr = Address(0x0001);
    let a_addr = Address(0x00A0);
    let b_addr = Address(0x00B0);

    let (hub_sim, mut hub) = node(hub_addr, GroupId(0x0042), true);
    let (a_sim, mut a) = node(a_addr, GroupId(0), false);
    let (b_sim, mut b) = node(b_addr, GroupId(0), false);

    println!("Building a three node tree: {} <- {} <- {}", hub_addr, a_addr, b_addr);

    // A hears the hub's beacon and answers in its reply slot
    hub.send_beacon().expect("hub beacon");
    relay(&hub_sim, &a_sim);
    match a.request_to_join().expect("join attempt") {
        JoinOutcome::Joined(info) => println!("- {} joined {} at level {}", a_addr, info.parent, info.level.level()),
        JoinOutcome::NoBeacon(reasons) => println!("- {} found no parent: {:?}", a_addr, reasons),
    }
    relay(&a_sim, &hub_sim);
    let outcome = hub.send_beacon().expect("hub beacon");
    println!("- hub linked {:?}", outcome.joined);

    // B can only hear A
    hub_sim.radio.take_sent();
    a.send_beacon().expect("beacon from A");
    relay(&a_sim, &b_sim);
    match b.request_to_join().expect("join attempt") {
        JoinOutcome::Joined(info) => println!("- {} joined {} at level {}", b_addr, info.parent, info.level.level()),
        JoinOutcome::NoBeacon(reasons) => println!("- {} found no parent: {:?}", b_addr, reasons),
    }
    relay(&b_sim, &a_sim);
    let outcome = a.send_beacon().expect("beacon from A");
    println!("- {} linked {:?}", a_addr, outcome.joined);

    // A reports its new edge to the hub
    let mut report = [0u8; MAX_FRAME_SIZE];
    let len = a.routes_mut().get_updates(&mut report, MAX_FRAME_SIZE).expect("routing update");
    hub.routes_mut().set_updates(&report[..len]).expect("apply routing update");
    a.routes_mut().clear_pending_updates(true);

    println!("\nHub routing table:\n{}", hub.routes());
    println!("Next hop from hub to {}: {:?}", b_addr, hub.routes().next_hop_opt(b_addr));
    println!("\nReport log of {}:", a_addr);
    for record in a_sim.log.records().expect("report log") {
        println!("  {:?} ({:?})", record.event, record.priority);
    }
}
