use std::collections::HashMap;
use std::net::TcpListener;
use std::time::Duration;

use launchkit::msa::{Auth, Endpoints, Error, Hop, Identity, InvalidResponse, Stage};

use serde_json::json;
use uuid::Uuid;

use mockito::{Matcher, Mock, Server, ServerGuard};

use tracing_subscriber::EnvFilter;


/// Print library logs while testing, filtered by `RUST_LOG`.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("launchkit=debug,hyper=warn,reqwest=warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

const PROFILE_ID: &str = "069a79f444e94726a5befca90e38aaf5";

fn auth(server: &ServerGuard) -> Auth {
    let url = server.url();
    let mut auth = Auth::new("client-id");
    auth.set_timeout(Some(Duration::from_secs(5)))
        .set_endpoints(Endpoints {
            authorize: format!("{url}/authorize"),
            token: format!("{url}/token"),
            xbl: format!("{url}/xbl"),
            xsts: format!("{url}/xsts"),
            game_login: format!("{url}/login"),
            profile: format!("{url}/profile"),
        });
    auth
}

struct Mocks {
    token: Mock,
    xbl: Mock,
    xsts: Mock,
    login: Mock,
    profile: Mock,
}

fn mock_vendor(server: &mut ServerGuard, grant_type: &str, access_token: &str) -> Mock {
    server.mock("POST", "/token")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("grant_type".into(), grant_type.into()),
            Matcher::UrlEncoded("client_id".into(), "client-id".into()),
            Matcher::UrlEncoded("scope".into(), "XboxLive.signin offline_access".into()),
        ]))
        .with_header("content-type", "application/json")
        .with_body(json!({
            "token_type": "Bearer",
            "scope": "XboxLive.signin offline_access",
            "expires_in": 3600,
            "access_token": access_token,
            "refresh_token": format!("{access_token}-refresh"),
        }).to_string())
        .create()
}

/// Mock all services of the chain, the vendor hop expects the given grant type.
fn mock_chain(server: &mut ServerGuard, grant_type: &str) -> Mocks {

    let token = mock_vendor(server, grant_type, "ms-access");

    let xbl = server.mock("POST", "/xbl")
        .match_body(Matcher::PartialJson(json!({
            "Properties": { "AuthMethod": "RPS", "RpsTicket": "d=ms-access" },
            "RelyingParty": "http://auth.xboxlive.com",
        })))
        .with_body(json!({
            "IssueInstant": "2025-01-01T00:00:00.0000000Z",
            "NotAfter": "2025-01-15T00:00:00.0000000Z",
            "Token": "xbl-token",
            "DisplayClaims": { "xui": [{ "uhs": "user-hash" }] }
        }).to_string())
        .create();

    let xsts = server.mock("POST", "/xsts")
        .match_body(Matcher::PartialJson(json!({
            "Properties": { "SandboxId": "RETAIL", "UserTokens": ["xbl-token"] },
            "RelyingParty": "rp://api.minecraftservices.com/",
        })))
        .with_body(json!({
            "Token": "xsts-token",
            "DisplayClaims": { "xui": [{ "uhs": "user-hash" }] }
        }).to_string())
        .create();

    let login = server.mock("POST", "/login")
        .match_body(Matcher::PartialJson(json!({
            "identityToken": "XBL3.0 x=user-hash;xsts-token",
        })))
        .with_body(json!({
            "username": "3a7e9c1e-0000-0000-0000-000000000000",
            "access_token": "mc-access",
            "token_type": "Bearer",
            "expires_in": 86400
        }).to_string())
        .create();

    let profile = server.mock("GET", "/profile")
        .match_header("authorization", "Bearer mc-access")
        .with_body(json!({
            "id": PROFILE_ID,
            "name": "Notch",
            "skins": [],
            "capes": []
        }).to_string())
        .create();

    Mocks { token, xbl, xsts, login, profile }

}

#[test]
fn authenticate() {

    init_tracing();

    let mut server = Server::new();
    let mocks = mock_chain(&mut server, "authorization_code");
    let auth = auth(&server);

    let mut store: HashMap<Uuid, Identity> = HashMap::new();
    let identity = auth.authenticate("the-code", &mut store).unwrap();

    mocks.token.assert();
    mocks.xbl.assert();
    mocks.xsts.assert();
    mocks.login.assert();
    mocks.profile.assert();

    let id = Uuid::parse_str(PROFILE_ID).unwrap();
    assert_eq!(identity.profile.id, id);
    assert_eq!(identity.profile.name, "Notch");
    assert_eq!(identity.vendor.access_token, "ms-access");
    assert_eq!(identity.vendor.refresh_token, "ms-access-refresh");
    assert_eq!(identity.game.access_token, "mc-access");
    assert!(!identity.is_expired());

    assert_eq!(store.len(), 1);
    assert_eq!(store[&id], identity);

}

#[test]
fn step_by_step() {

    init_tracing();

    let mut server = Server::new();
    let _mocks = mock_chain(&mut server, "authorization_code");
    let auth = auth(&server);

    let mut stage = Stage::Init { code: "the-code".to_string() };
    let mut hops = Vec::new();

    let identity: Identity = loop {
        hops.extend(stage.next_hop());
        stage = match auth.advance(stage).unwrap() {
            Stage::Done(identity) => break identity,
            stage => stage,
        };
    };

    assert_eq!(hops, [Hop::Vendor, Hop::Network, Hop::Security, Hop::Game, Hop::Profile]);
    assert_eq!(identity.profile.name, "Notch");

}

#[test]
fn network_failure_stops_chain() {

    init_tracing();

    let mut server = Server::new();
    mock_vendor(&mut server, "authorization_code", "ms-access");

    server.mock("POST", "/xbl")
        .with_status(400)
        .create();
    let xsts = server.mock("POST", "/xsts").expect(0).create();
    let login = server.mock("POST", "/login").expect(0).create();
    let profile = server.mock("GET", "/profile").expect(0).create();

    let auth = auth(&server);
    let mut store: HashMap<Uuid, Identity> = HashMap::new();
    let err = auth.authenticate("the-code", &mut store).unwrap_err();

    assert!(matches!(err, Error::NetworkInvalidResponse(InvalidResponse::Status(400))), "{err:?}");
    assert_eq!(err.hop(), Some(Hop::Network));
    assert!(store.is_empty());

    xsts.assert();
    login.assert();
    profile.assert();

}

#[test]
fn security_missing_user_hash() {

    init_tracing();

    let mut server = Server::new();
    let mocks = mock_chain(&mut server, "authorization_code");
    mocks.xsts.remove();

    server.mock("POST", "/xsts")
        .with_body(json!({ "Token": "xsts-token", "DisplayClaims": { "xui": [] } }).to_string())
        .create();

    let auth = auth(&server);
    let err = auth.authenticate("the-code", &mut HashMap::<Uuid, Identity>::new()).unwrap_err();
    assert!(matches!(err, Error::SecurityInvalidResponse(InvalidResponse::Unexpected(_))), "{err:?}");

}

#[test]
fn game_invalid_body() {

    init_tracing();

    let mut server = Server::new();
    let mocks = mock_chain(&mut server, "authorization_code");
    mocks.login.remove();

    server.mock("POST", "/login")
        .with_body(r#"{ "access_token": 42 }"#)
        .create();

    let auth = auth(&server);
    let err = auth.authenticate("the-code", &mut HashMap::<Uuid, Identity>::new()).unwrap_err();
    assert!(matches!(err, Error::GameInvalidResponse(InvalidResponse::Decode(_))), "{err:?}");
    assert_eq!(err.hop(), Some(Hop::Game));

}

#[test]
fn profile_not_owned() {

    init_tracing();

    let mut server = Server::new();
    let mocks = mock_chain(&mut server, "authorization_code");
    mocks.profile.remove();

    server.mock("GET", "/profile")
        .with_status(404)
        .create();

    let auth = auth(&server);
    let err = auth.authenticate("the-code", &mut HashMap::<Uuid, Identity>::new()).unwrap_err();
    assert!(matches!(err, Error::ProfileInvalidResponse(InvalidResponse::Status(404))), "{err:?}");

}

#[test]
fn refresh_identity() {

    init_tracing();

    let mut server = Server::new();
    let mocks = mock_chain(&mut server, "authorization_code");
    let auth = auth(&server);

    let mut store: HashMap<Uuid, Identity> = HashMap::new();
    let identity = auth.authenticate("the-code", &mut store).unwrap();
    mocks.token.remove();

    let refresh = server.mock("POST", "/token")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
            Matcher::UrlEncoded("refresh_token".into(), "ms-access-refresh".into()),
        ]))
        .with_body(json!({
            "token_type": "Bearer",
            "expires_in": 3600,
            "access_token": "ms-access"
        }).to_string())
        .expect(2)
        .create();

    let vendor = auth.refresh(&identity.vendor).unwrap();
    assert_eq!(vendor.access_token, "ms-access");
    // Kept when the vendor doesn't issue a new refresh token.
    assert_eq!(vendor.refresh_token, "ms-access-refresh");

    let renewed = auth.refresh_identity(&identity, &mut store).unwrap();
    assert_eq!(renewed.profile, identity.profile);
    assert_eq!(store.len(), 1);

    refresh.assert();

}

#[test]
fn vendor_could_not_connect() {

    init_tracing();

    // Nothing listens on a port that has just been released.
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let mut auth = Auth::new("client-id");
    auth.set_endpoints(Endpoints {
        token: format!("{url}/token"),
        ..Endpoints::default()
    });

    let err = auth.authenticate("the-code", &mut HashMap::<Uuid, Identity>::new()).unwrap_err();
    assert!(matches!(err, Error::VendorCouldNotConnect(_)), "{err:?}");
    assert!(err.is_connect());
    assert_eq!(err.hop(), Some(Hop::Vendor));

}
