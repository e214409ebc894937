//! Connects to a public broker, subscribes to `bla` and publishes
//! `hello world` on `dummy` every ten seconds, printing whatever arrives.
//! Reconnects after two seconds whenever the session drops.

use std::thread::sleep;
use std::time::Duration;

use libpubsub::network::application::mqtt::{Client, Options, QoS, Server};
use libpubsub::network::tcp::TcpTransport;
use libpubsub::time::StdClock;

const BROKER: &str = "test.mosquitto.org";
const PORT: u16 = 1883;
const PUBLISH_EVERY: u8 = 10;

fn on_message(topic: &str, payload: &[u8]) {
    println!(">>Received: {}::{}", topic, String::from_utf8_lossy(payload));
}

fn main() {
    let server = match Server::host(BROKER, PORT) {
        Ok(server) => server,
        Err(e) => {
            eprintln!("invalid broker address: {:?}", e);
            return;
        }
    };
    let mut client: Client<_, _, _> =
        Client::new(TcpTransport::new(), StdClock::new(), server, on_message);

    let mut interval = 0u8;
    loop {
        println!("\ntry to connect...");
        match client.connect(&Options::new("mqttClient")) {
            Ok(()) => {
                println!("    * connected *");
                if let Err(e) = client.subscribe("bla", QoS::AtMostOnce) {
                    eprintln!("subscribe failed: {:?}", e);
                }

                while client.poll().is_ok() {
                    interval += 1;
                    sleep(Duration::from_secs(1));
                    if interval > PUBLISH_EVERY {
                        interval = 0;
                        println!("try to publish...");
                        match client.publish("dummy", b"hello world", false) {
                            Ok(()) => println!("    * published *"),
                            Err(e) => {
                                eprintln!("publish failed: {:?}", e);
                                client.disconnect().ok();
                            }
                        }
                    }
                }
                println!("connection ended: {:?}", client.state());
            }
            Err(e) => println!("connect failed: {:?} ({})", e, client.state().code()),
        }
        sleep(Duration::from_secs(2));
    }
}
