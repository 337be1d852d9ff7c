//! Microsoft Account authentication for Minecraft accounts, from an authorization code
//! to the Minecraft profile through Xbox Live.
//!
//! See https://minecraft.wiki/w/Microsoft_authentication

use std::collections::HashMap;
use std::time::Duration;
use std::io;

use chrono::{DateTime, TimeDelta, Utc};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, trace};
use uuid::Uuid;


/// The scope requested to the vendor, offline access is needed to get a refresh token.
pub const SCOPE: &str = "XboxLive.signin offline_access";

/// Default redirect URI registered for the application.
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost:1989";

/// URLs of every service involved in the authentication.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// Vendor authorization page, visited by the user to obtain a code.
    pub authorize: String,
    /// Vendor token exchange.
    pub token: String,
    /// Xbox Live user authentication.
    pub xbl: String,
    /// Xbox Live security token service.
    pub xsts: String,
    /// Minecraft login with Xbox.
    pub game_login: String,
    /// Minecraft profile.
    pub profile: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            authorize: "https://login.microsoftonline.com/consumers/oauth2/v2.0/authorize".to_string(),
            token: "https://login.microsoftonline.com/consumers/oauth2/v2.0/token".to_string(),
            xbl: "https://user.auth.xboxlive.com/user/authenticate".to_string(),
            xsts: "https://xsts.auth.xboxlive.com/xsts/authorize".to_string(),
            game_login: "https://api.minecraftservices.com/authentication/login_with_xbox".to_string(),
            profile: "https://api.minecraftservices.com/minecraft/profile".to_string(),
        }
    }
}

/// Microsoft Account authenticator, each hop of the authentication is strictly
/// sequential and can be driven step by step with [`Self::advance`].
#[derive(Debug, Clone)]
pub struct Auth {
    client_id: String,
    redirect_uri: String,
    endpoints: Endpoints,
    timeout: Option<Duration>,
}

impl Auth {

    /// Create a new authenticator with the given application (client) id.
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            redirect_uri: DEFAULT_REDIRECT_URI.to_string(),
            endpoints: Endpoints::default(),
            timeout: None,
        }
    }

    #[inline]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// The redirect URI where the vendor sends the authorization code.
    #[inline]
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// See [`Self::redirect_uri`].
    #[inline]
    pub fn set_redirect_uri(&mut self, redirect_uri: impl Into<String>) -> &mut Self {
        self.redirect_uri = redirect_uri.into();
        self
    }

    #[inline]
    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// See [`Self::endpoints`].
    #[inline]
    pub fn set_endpoints(&mut self, endpoints: Endpoints) -> &mut Self {
        self.endpoints = endpoints;
        self
    }

    /// The timeout of each request, none to use the transport default.
    #[inline]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// See [`Self::timeout`].
    #[inline]
    pub fn set_timeout(&mut self, timeout: Option<Duration>) -> &mut Self {
        self.timeout = timeout;
        self
    }

    /// Build the vendor authorization URL that the user should visit to grant access
    /// and obtain the authorization code, sent to the redirect URI.
    pub fn authorize_url(&self) -> Result<reqwest::Url> {
        reqwest::Url::parse_with_params(&self.endpoints.authorize, &[
            ("client_id", self.client_id.as_str()),
            ("response_type", "code"),
            ("redirect_uri", self.redirect_uri.as_str()),
            ("scope", SCOPE),
            ("prompt", "select_account"),
        ]).map_err(|_| Error::InvalidEndpoint { url: self.endpoints.authorize.clone() })
    }

    /// Run the whole authentication from the given authorization code and register
    /// the resulting identity into the given store.
    pub fn authenticate(&self, code: &str, store: &mut impl IdentityStore) -> Result<Identity> {
        let identity = self.run(Stage::Init { code: code.to_string() })?;
        store.register(identity.clone());
        Ok(identity)
    }

    /// Refresh the vendor token of the given identity and run the following hops again
    /// to renew the whole session, the renewed identity is registered into the store.
    pub fn refresh_identity(&self, identity: &Identity, store: &mut impl IdentityStore) -> Result<Identity> {
        let vendor = self.refresh(&identity.vendor)?;
        let identity = self.run(Stage::HaveVendorToken(vendor))?;
        store.register(identity.clone());
        Ok(identity)
    }

    /// Only repeat the first hop, exchanging the refresh token for a new vendor token.
    pub fn refresh(&self, vendor: &VendorToken) -> Result<VendorToken> {
        crate::tokio::sync(async {
            let client = self.client()?;
            let req = VendorTokenRequest::RefreshToken {
                client_id: &self.client_id,
                scope: SCOPE,
                refresh_token: &vendor.refresh_token,
                redirect_uri: &self.redirect_uri,
            };
            let mut refreshed = request_vendor_token(&client, &self.endpoints.token, &req).await?;
            if refreshed.refresh_token.is_empty() {
                refreshed.refresh_token = vendor.refresh_token.clone();
            }
            Ok(refreshed)
        }).map_err(Error::Runtime)?
    }

    /// Advance the given stage by a single hop, a done stage is returned unchanged.
    pub fn advance(&self, stage: Stage) -> Result<Stage> {
        crate::tokio::sync(async {
            let client = self.client()?;
            self.advance_with(&client, stage).await
        }).map_err(Error::Runtime)?
    }

    /// Advance the given stage until done.
    fn run(&self, stage: Stage) -> Result<Identity> {
        crate::tokio::sync(async {
            let client = self.client()?;
            let mut stage = stage;
            loop {
                stage = match self.advance_with(&client, stage).await? {
                    Stage::Done(identity) => break Ok(identity),
                    stage => stage,
                };
            }
        }).map_err(Error::Runtime)?
    }

    fn client(&self) -> Result<Client> {
        crate::http::client(self.timeout).map_err(Error::Client)
    }

    async fn advance_with(&self, client: &Client, stage: Stage) -> Result<Stage> {
        Ok(match stage {
            Stage::Init { code } => {
                let req = VendorTokenRequest::AuthorizationCode {
                    client_id: &self.client_id,
                    scope: SCOPE,
                    code: &code,
                    redirect_uri: &self.redirect_uri,
                };
                let vendor = request_vendor_token(client, &self.endpoints.token, &req).await?;
                if vendor.refresh_token.is_empty() {
                    return Err(Error::VendorInvalidResponse(InvalidResponse::Unexpected("missing refresh token".into())));
                }
                Stage::HaveVendorToken(vendor)
            }
            Stage::HaveVendorToken(vendor) => {
                let network = request_network_token(client, &self.endpoints.xbl, &vendor).await?;
                Stage::HaveNetworkToken { vendor, network }
            }
            Stage::HaveNetworkToken { vendor, network } => {
                let security = request_security_token(client, &self.endpoints.xsts, &network).await?;
                Stage::HaveSecurityToken { vendor, security }
            }
            Stage::HaveSecurityToken { vendor, security } => {
                let game = request_game_token(client, &self.endpoints.game_login, &security).await?;
                Stage::HaveGameToken { vendor, game }
            }
            Stage::HaveGameToken { vendor, game } => {
                let profile = request_profile(client, &self.endpoints.profile, &game).await?;
                debug!(id = %profile.id, name = %profile.name, "authenticated");
                Stage::Done(Identity { profile, vendor, game })
            }
            Stage::Done(identity) => Stage::Done(identity),
        })
    }

}

/// State of an authentication, each stage holds the tokens required by the next hop.
#[derive(Debug, Clone)]
pub enum Stage {
    Init {
        code: String,
    },
    HaveVendorToken(VendorToken),
    HaveNetworkToken {
        vendor: VendorToken,
        network: NetworkToken,
    },
    HaveSecurityToken {
        vendor: VendorToken,
        security: SecurityToken,
    },
    HaveGameToken {
        vendor: VendorToken,
        game: GameToken,
    },
    Done(Identity),
}

impl Stage {

    /// The hop that would be run to advance this stage, none if done.
    pub fn next_hop(&self) -> Option<Hop> {
        Some(match self {
            Stage::Init { .. } => Hop::Vendor,
            Stage::HaveVendorToken(_) => Hop::Network,
            Stage::HaveNetworkToken { .. } => Hop::Security,
            Stage::HaveSecurityToken { .. } => Hop::Game,
            Stage::HaveGameToken { .. } => Hop::Profile,
            Stage::Done(_) => return None,
        })
    }

}

/// Microsoft OAuth token, its refresh token allows renewing the whole session.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct VendorToken {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

/// Xbox Live user token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkToken {
    pub token: String,
}

/// Xbox Live security token, with the user hash it's been issued for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecurityToken {
    pub token: String,
    pub user_hash: String,
}

/// Minecraft access token, used to launch the game.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct GameToken {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct GameProfile {
    /// The real UUID of the Minecraft account.
    #[serde(with = "uuid::serde::simple")]
    pub id: Uuid,
    /// The username of the Minecraft account.
    pub name: String,
    #[serde(default)]
    pub skins: Vec<ProfileSkin>,
    #[serde(default)]
    pub capes: Vec<ProfileCape>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ProfileSkin {
    pub id: String,
    pub state: String,
    pub url: String,
    #[serde(default)]
    pub variant: Option<String>,
    #[serde(default)]
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ProfileCape {
    pub id: String,
    pub state: String,
    pub url: String,
    #[serde(default)]
    pub alias: Option<String>,
}

/// An authenticated Minecraft account.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Identity {
    pub profile: GameProfile,
    pub vendor: VendorToken,
    pub game: GameToken,
}

impl Identity {

    /// Return true if the game token has expired, the identity should be refreshed.
    pub fn is_expired(&self) -> bool {
        self.game.expires_at <= Utc::now()
    }

}

/// A store of authenticated identities.
pub trait IdentityStore {

    /// Register the given identity, replacing any previous one of the same profile.
    fn register(&mut self, identity: Identity);

}

impl IdentityStore for HashMap<Uuid, Identity> {
    fn register(&mut self, identity: Identity) {
        self.insert(identity.profile.id, identity);
    }
}

/// The hop of the authentication that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hop {
    /// Authorization code or refresh token to Microsoft token.
    Vendor,
    /// Microsoft token to Xbox Live token.
    Network,
    /// Xbox Live token to XSTS token.
    Security,
    /// XSTS token to Minecraft token.
    Game,
    /// Minecraft token to Minecraft profile.
    Profile,
}

/// The error type of the authentication, each hop fails either because the service
/// could not be reached or because it answered with an invalid response.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("vendor could not connect: {0}")]
    VendorCouldNotConnect(#[source] reqwest::Error),
    #[error("vendor invalid response: {0}")]
    VendorInvalidResponse(#[source] InvalidResponse),
    #[error("network could not connect: {0}")]
    NetworkCouldNotConnect(#[source] reqwest::Error),
    #[error("network invalid response: {0}")]
    NetworkInvalidResponse(#[source] InvalidResponse),
    #[error("security could not connect: {0}")]
    SecurityCouldNotConnect(#[source] reqwest::Error),
    #[error("security invalid response: {0}")]
    SecurityInvalidResponse(#[source] InvalidResponse),
    #[error("game could not connect: {0}")]
    GameCouldNotConnect(#[source] reqwest::Error),
    #[error("game invalid response: {0}")]
    GameInvalidResponse(#[source] InvalidResponse),
    #[error("profile could not connect: {0}")]
    ProfileCouldNotConnect(#[source] reqwest::Error),
    #[error("profile invalid response: {0}")]
    ProfileInvalidResponse(#[source] InvalidResponse),
    /// The runtime could not be created, before any hop.
    #[error("runtime: {0}")]
    Runtime(#[source] io::Error),
    /// The HTTP client could not be created, before any hop.
    #[error("client: {0}")]
    Client(#[source] reqwest::Error),
    /// A configured endpoint is not a valid URL.
    #[error("invalid endpoint: {url}")]
    InvalidEndpoint {
        url: String,
    },
}

impl Error {

    /// The hop that failed, none if the error happened outside of any hop.
    pub fn hop(&self) -> Option<Hop> {
        Some(match self {
            Error::VendorCouldNotConnect(_) | Error::VendorInvalidResponse(_) => Hop::Vendor,
            Error::NetworkCouldNotConnect(_) | Error::NetworkInvalidResponse(_) => Hop::Network,
            Error::SecurityCouldNotConnect(_) | Error::SecurityInvalidResponse(_) => Hop::Security,
            Error::GameCouldNotConnect(_) | Error::GameInvalidResponse(_) => Hop::Game,
            Error::ProfileCouldNotConnect(_) | Error::ProfileInvalidResponse(_) => Hop::Profile,
            Error::Runtime(_) | Error::Client(_) | Error::InvalidEndpoint { .. } => return None,
        })
    }

    /// Return true if the service could not be reached, the hop may succeed later.
    pub fn is_connect(&self) -> bool {
        matches!(self,
            Error::VendorCouldNotConnect(_) |
            Error::NetworkCouldNotConnect(_) |
            Error::SecurityCouldNotConnect(_) |
            Error::GameCouldNotConnect(_) |
            Error::ProfileCouldNotConnect(_))
    }

}

/// Type alias for a result with the authentication error type.
pub type Result<T> = std::result::Result<T, Error>;

/// A service answered but its response can't be used.
#[derive(thiserror::Error, Debug)]
pub enum InvalidResponse {
    /// Non-successful HTTP status code.
    #[error("status: {0}")]
    Status(u16),
    /// The response body could not be decoded.
    #[error("decode: {0}")]
    Decode(#[from] serde_path_to_error::Error<serde_json::Error>),
    /// The response is well-formed but its content is not the expected one.
    #[error("unexpected: {0}")]
    Unexpected(Box<str>),
}

/// Internal failure of a request, converted to an error once its hop is known.
enum Failure {
    Connect(reqwest::Error),
    Invalid(InvalidResponse),
}

impl From<InvalidResponse> for Failure {
    fn from(value: InvalidResponse) -> Self {
        Self::Invalid(value)
    }
}

impl Failure {

    fn at(self, hop: Hop) -> Error {
        match (hop, self) {
            (Hop::Vendor, Failure::Connect(e)) => Error::VendorCouldNotConnect(e),
            (Hop::Vendor, Failure::Invalid(e)) => Error::VendorInvalidResponse(e),
            (Hop::Network, Failure::Connect(e)) => Error::NetworkCouldNotConnect(e),
            (Hop::Network, Failure::Invalid(e)) => Error::NetworkInvalidResponse(e),
            (Hop::Security, Failure::Connect(e)) => Error::SecurityCouldNotConnect(e),
            (Hop::Security, Failure::Invalid(e)) => Error::SecurityInvalidResponse(e),
            (Hop::Game, Failure::Connect(e)) => Error::GameCouldNotConnect(e),
            (Hop::Game, Failure::Invalid(e)) => Error::GameInvalidResponse(e),
            (Hop::Profile, Failure::Connect(e)) => Error::ProfileCouldNotConnect(e),
            (Hop::Profile, Failure::Invalid(e)) => Error::ProfileInvalidResponse(e),
        }
    }

}

/// Send the given request and decode its successful JSON response.
async fn exchange<T: DeserializeOwned>(req: RequestBuilder) -> std::result::Result<T, Failure> {

    let res = req.send().await.map_err(Failure::Connect)?;
    let status = res.status();
    let raw = res.bytes().await.map_err(Failure::Connect)?;

    if !status.is_success() {
        trace!(status = status.as_u16(), body = %String::from_utf8_lossy(&raw), "unsuccessful response");
        return Err(InvalidResponse::Status(status.as_u16()).into());
    }

    let mut deserializer = serde_json::Deserializer::from_slice(&raw);
    Ok(serde_path_to_error::deserialize(&mut deserializer).map_err(InvalidResponse::Decode)?)

}

fn check_bearer(token_type: &str) -> std::result::Result<(), InvalidResponse> {
    if token_type.eq_ignore_ascii_case("bearer") {
        Ok(())
    } else {
        Err(InvalidResponse::Unexpected(format!("unexpected token type: {token_type}").into()))
    }
}

fn expires_at(expires_in: u64) -> DateTime<Utc> {
    i64::try_from(expires_in).ok()
        .and_then(TimeDelta::try_seconds)
        .and_then(|delta| Utc::now().checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

async fn request_vendor_token(
    client: &Client,
    url: &str,
    req: &VendorTokenRequest<'_>,
) -> Result<VendorToken> {

    trace!(url, "requesting vendor token");

    let res = exchange::<VendorTokenSuccess>(client.post(url).form(req)).await
        .map_err(|f| f.at(Hop::Vendor))?;

    check_bearer(&res.token_type).map_err(Error::VendorInvalidResponse)?;

    Ok(VendorToken {
        access_token: res.access_token,
        refresh_token: res.refresh_token.unwrap_or_default(),
        expires_at: expires_at(res.expires_in),
    })

}

async fn request_network_token(
    client: &Client,
    url: &str,
    vendor: &VendorToken,
) -> Result<NetworkToken> {

    trace!(url, "requesting network token");

    let req = json!({
        "Properties": {
            "AuthMethod": "RPS",
            "SiteName": "user.auth.xboxlive.com",
            "RpsTicket": format!("d={}", vendor.access_token),
        },
        "RelyingParty": "http://auth.xboxlive.com",
        "TokenType": "JWT"
    });

    let res = exchange::<XblSuccess>(client.post(url).json(&req)).await
        .map_err(|f| f.at(Hop::Network))?;

    Ok(NetworkToken { token: res.token })

}

async fn request_security_token(
    client: &Client,
    url: &str,
    network: &NetworkToken,
) -> Result<SecurityToken> {

    trace!(url, "requesting security token");

    let req = json!({
        "Properties": {
            "SandboxId": "RETAIL",
            "UserTokens": [network.token]
        },
        "RelyingParty": "rp://api.minecraftservices.com/",
        "TokenType": "JWT"
    });

    let res = exchange::<XblSuccess>(client.post(url).json(&req)).await
        .map_err(|f| f.at(Hop::Security))?;

    let Some(xui) = res.display_claims.xui.into_iter().next() else {
        return Err(Error::SecurityInvalidResponse(InvalidResponse::Unexpected("missing user hash".into())));
    };

    Ok(SecurityToken {
        token: res.token,
        user_hash: xui.uhs,
    })

}

async fn request_game_token(
    client: &Client,
    url: &str,
    security: &SecurityToken,
) -> Result<GameToken> {

    trace!(url, "requesting game token");

    let req = json!({
        "identityToken": format!("XBL3.0 x={};{}", security.user_hash, security.token),
    });

    let res = exchange::<GameLoginSuccess>(client.post(url).json(&req)).await
        .map_err(|f| f.at(Hop::Game))?;

    check_bearer(&res.token_type).map_err(Error::GameInvalidResponse)?;

    Ok(GameToken {
        access_token: res.access_token,
        expires_at: expires_at(res.expires_in),
    })

}

async fn request_profile(
    client: &Client,
    url: &str,
    game: &GameToken,
) -> Result<GameProfile> {

    trace!(url, "requesting profile");

    exchange::<GameProfile>(client.get(url).bearer_auth(&game.access_token)).await
        .map_err(|f| f.at(Hop::Profile))

}

/// (URL encoded)
#[derive(Debug, Clone, serde::Serialize)]
#[serde(tag = "grant_type")]
enum VendorTokenRequest<'a> {
    #[serde(rename = "authorization_code")]
    AuthorizationCode {
        client_id: &'a str,
        scope: &'a str,
        code: &'a str,
        redirect_uri: &'a str,
    },
    #[serde(rename = "refresh_token")]
    RefreshToken {
        client_id: &'a str,
        scope: &'a str,
        refresh_token: &'a str,
        redirect_uri: &'a str,
    },
}

/// (JSON)
#[derive(Debug, Clone, serde::Deserialize)]
struct VendorTokenSuccess {
    /// Always "Bearer"
    token_type: String,
    expires_in: u64,
    access_token: String,
    /// Issued if the original scope parameter included offline_access.
    #[serde(default)]
    refresh_token: Option<String>,
}

/// (JSON)
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
struct XblSuccess {
    display_claims: XblDisplayClaims,
    token: String,
}

/// (JSON)
#[derive(Debug, Clone, serde::Deserialize)]
struct XblDisplayClaims {
    #[serde(default)]
    xui: Vec<XblXui>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
struct XblXui {
    uhs: String,
}

/// (JSON)
#[derive(Debug, Clone, serde::Deserialize)]
struct GameLoginSuccess {
    /// The actual Minecraft access token to use to launch the game.
    access_token: String,
    token_type: String,
    expires_in: u64,
}

#[cfg(test)]
mod tests {

    use super::*;

    #[test]
    fn authorize_url() {

        let auth = Auth::new("00000000-0000-0000-0000-000000000000");
        let url = auth.authorize_url().unwrap();
        assert_eq!(url.host_str(), Some("login.microsoftonline.com"));
        assert_eq!(url.path(), "/consumers/oauth2/v2.0/authorize");

        let query = url.query_pairs().collect::<HashMap<_, _>>();
        assert_eq!(query["client_id"], "00000000-0000-0000-0000-000000000000");
        assert_eq!(query["response_type"], "code");
        assert_eq!(query["redirect_uri"], DEFAULT_REDIRECT_URI);
        assert_eq!(query["scope"], SCOPE);

    }

    #[test]
    fn stage_hops() {

        assert_eq!(Stage::Init { code: String::new() }.next_hop(), Some(Hop::Vendor));

        let vendor = VendorToken {
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
            expires_at: Utc::now(),
        };
        assert_eq!(Stage::HaveVendorToken(vendor.clone()).next_hop(), Some(Hop::Network));

        let game = GameToken { access_token: "g".to_string(), expires_at: Utc::now() };
        assert_eq!(Stage::HaveGameToken { vendor, game }.next_hop(), Some(Hop::Profile));

    }

    #[test]
    fn error_hop() {
        let err = Error::SecurityInvalidResponse(InvalidResponse::Status(401));
        assert_eq!(err.hop(), Some(Hop::Security));
        assert!(!err.is_connect());
        assert_eq!(Error::Runtime(io::ErrorKind::Other.into()).hop(), None);
    }

    #[test]
    fn client_error_has_no_hop() {

        let err = reqwest::Client::new().get("not a url").build().unwrap_err();
        let err = Error::Client(err);
        assert_eq!(err.hop(), None);
        assert!(!err.is_connect());

        let err = Error::InvalidEndpoint { url: "nowhere".to_string() };
        assert_eq!(err.hop(), None);

    }

    #[test]
    fn authorize_url_invalid_endpoint() {
        let mut auth = Auth::new("client-id");
        auth.set_endpoints(Endpoints {
            authorize: "not a url".to_string(),
            ..Endpoints::default()
        });
        assert!(matches!(auth.authorize_url(), Err(Error::InvalidEndpoint { url }) if url == "not a url"));
    }

    #[test]
    fn bearer() {
        assert!(check_bearer("Bearer").is_ok());
        assert!(check_bearer("bearer").is_ok());
        assert!(matches!(check_bearer("MAC"), Err(InvalidResponse::Unexpected(_))));
    }

    #[test]
    fn profile_decode() {

        let profile: GameProfile = serde_json::from_str(r#"{
            "id": "069a79f444e94726a5befca90e38aaf5",
            "name": "Notch",
            "skins": [{
                "id": "6a6e65e5-76dd-4c3c-a625-162924514568",
                "state": "ACTIVE",
                "url": "http://textures.minecraft.net/texture/1a4af718455d4aab528e7a61f86fa25e6a369d1768dcb13f7df319a713eb810b",
                "variant": "CLASSIC"
            }],
            "capes": []
        }"#).unwrap();

        assert_eq!(profile.id, Uuid::parse_str("069a79f4-44e9-4726-a5be-fca90e38aaf5").unwrap());
        assert_eq!(profile.name, "Notch");
        assert_eq!(profile.skins.len(), 1);
        assert_eq!(profile.skins[0].variant.as_deref(), Some("CLASSIC"));
        assert!(profile.capes.is_empty());

        let mut store: HashMap<Uuid, Identity> = HashMap::new();
        let identity = Identity {
            profile: profile.clone(),
            vendor: VendorToken { access_token: "a".to_string(), refresh_token: "r".to_string(), expires_at: Utc::now() },
            game: GameToken { access_token: "g".to_string(), expires_at: Utc::now() - TimeDelta::seconds(1) },
        };
        assert!(identity.is_expired());
        store.register(identity);
        assert_eq!(store[&profile.id].profile.name, "Notch");

    }

}
