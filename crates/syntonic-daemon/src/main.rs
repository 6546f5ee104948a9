use std::rc::Rc;
use std::sync::Arc;

use syntonic::clock::{
    ClockAccuracy, ClockIdentity, ClockQuality, DefaultDS, LocalClock, Priority1, Priority2,
    TimeScale,
};
use syntonic::port::DomainNumber;
use syntonic::profile::PortProfile;
use syntonic::servo::{FilteringServo, Servo, ServoConfig};
use syntonic::time::TimeStamp;

use syntonic_daemon::log::TRACING_CLOCK_METRICS;
use syntonic_daemon::net::MulticastSocket;
use syntonic_daemon::node::OrdinaryNode;
use syntonic_daemon::virtualclock::{SharedVirtualClock, VirtualClock};

#[tokio::main(flavor = "current_thread")]
async fn main() -> std::io::Result<()> {
    syntonic_daemon::init_tracing();

    let clock = SharedVirtualClock(Arc::new(VirtualClock::new(
        TimeStamp::new(0, 0),
        1.0,
        TimeScale::Ptp,
    )));

    let default_ds = DefaultDS {
        clock_identity: ClockIdentity::new(&[0x00, 0x1b, 0x19, 0xff, 0xfe, 0x00, 0x00, 0x01]),
        number_ports: 1,
        clock_quality: ClockQuality::new(248, ClockAccuracy::new(0xfe), 0xffff),
        priority1: Priority1::new(128),
        priority2: Priority2::new(128),
        domain_number: DomainNumber::new(0),
        slave_only: false,
    };

    let local_clock = LocalClock::new(
        clock.clone(),
        default_ds,
        Servo::Filtering(FilteringServo::new(
            ServoConfig::default(),
            &TRACING_CLOCK_METRICS,
        )),
    );

    let event_socket = Rc::new(MulticastSocket::event().await?);
    let general_socket = Rc::new(MulticastSocket::general().await?);

    let node = OrdinaryNode::new(
        clock,
        local_clock,
        event_socket,
        general_socket,
        DomainNumber::new(0),
        PortProfile::default(),
    );

    node.run().await
}
