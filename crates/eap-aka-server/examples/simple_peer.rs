use eap_aka_proto::aka::{challenge_response, notification_response};
use eap_aka_proto::{AkaMessage, AkaMethod, AttributeType, EapCode, EapPacket, SessionKeys, Subtype};
use eap_aka_server::{decode_frame, encode_frame, Config};
use std::net::UdpSocket;

/// Run one EAP-AKA exchange against a server using the first subscriber
/// of a configuration file
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <config.json> [server_addr]", args[0]);
        eprintln!("Example: {} config.json 127.0.0.1:9109", args[0]);
        std::process::exit(1);
    }

    let config = Config::from_file(&args[1])?;
    let server_addr = args.get(2).map(|s| s.as_str()).unwrap_or("127.0.0.1:9109");
    let subscriber = config
        .subscribers
        .first()
        .ok_or("configuration has no subscribers")?;

    let identity = format!("0{}@wlan.mnc001.mcc001.3gppnetwork.org", subscriber.imsi);
    let session_id = format!("simple-peer:{}", std::process::id());

    println!("EAP-AKA Peer Test");
    println!("=================");
    println!("Server: {}", server_addr);
    println!("Identity: {}", identity);
    println!();

    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.connect(server_addr)?;
    socket.set_read_timeout(Some(std::time::Duration::from_secs(5)))?;

    let send = |packet: &EapPacket| -> Result<EapPacket, Box<dyn std::error::Error>> {
        socket.send(&encode_frame(&session_id, packet)?)?;
        let mut buffer = vec![0u8; 4096];
        let len = socket.recv(&mut buffer)?;
        let (_, reply) = decode_frame(&buffer[..len])?;
        Ok(reply)
    };

    println!("Sending EAP-Response/Identity...");
    let reply = send(&EapPacket::identity_response(1, &identity))?;
    let challenge = AkaMessage::from_eap(&reply)?;

    if challenge.subtype != Subtype::Challenge {
        println!("\n✗ Expected AKA-Challenge, got {:?}", challenge.subtype);
        if challenge.subtype == Subtype::Notification {
            send(&notification_response(reply.identifier, AkaMethod::Aka))?;
        }
        return Ok(());
    }
    println!("Received AKA-Challenge (identifier {})", reply.identifier);

    // The peer's USIM would compute these from RAND; reuse the provisioned values
    let autn = challenge.require(AttributeType::Autn)?.as_block()?;
    let ck: [u8; 16] = hex::decode(&subscriber.ck)?.try_into().map_err(|_| "bad ck")?;
    let ik: [u8; 16] = hex::decode(&subscriber.ik)?.try_into().map_err(|_| "bad ik")?;
    let res = hex::decode(&subscriber.xres)?;
    let keys = SessionKeys::derive(
        AkaMethod::Aka,
        identity.as_bytes(),
        &ck,
        &ik,
        &config.access_network_name,
        &autn,
    )?;

    if !challenge.verify_mac(&keys.k_aut) {
        println!("\n✗ Challenge AT_MAC does not verify");
        return Ok(());
    }

    let reply = send(&challenge_response(reply.identifier, AkaMethod::Aka, &res, &keys.k_aut)?)?;
    match reply.code {
        EapCode::Success => {
            println!("\n✓ Authentication SUCCESSFUL!");
            println!("  MSK: {}", hex::encode(keys.msk));
        }
        code => println!("\n✗ Authentication FAILED ({:?})", code),
    }

    Ok(())
}
