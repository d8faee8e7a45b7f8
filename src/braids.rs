use aliri_braid::braid;
use std::fmt;

macro_rules! redacted {
    ($ty:ty: $label:literal, $lead:literal) => {
        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                if f.alternate() {
                    f.write_str("\"")?;
                    write_lead(&self.0, $lead, f)?;
                    f.write_str("\"")
                } else {
                    f.write_str(concat!("***", $label, "***"))
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str(concat!("***", $label, "***"))
            }
        }
    };
}

fn write_lead(unprotected: &str, lead: usize, f: &mut fmt::Formatter) -> fmt::Result {
    match unprotected.char_indices().nth(lead) {
        Some((idx, _)) => {
            f.write_str(&unprotected[..idx])?;
            f.write_str("…")
        }
        None => f.write_str(unprotected),
    }
}

/// A client ID registered with the identity provider
#[braid(serde)]
pub struct ClientId;

/// An opaque bearer credential authorizing API calls
#[braid(serde, debug = "owned", display = "owned")]
pub struct AccessToken;

redacted!(AccessTokenRef: "ACCESS TOKEN", 6);

/// A signed assertion of user identity issued by the provider
#[braid(serde)]
pub struct IdToken;

/// An opaque credential used to mint new access tokens
#[braid(serde, debug = "owned", display = "owned")]
pub struct RefreshToken;

redacted!(RefreshTokenRef: "REFRESH TOKEN", 4);

/// An OAuth2 scope requested during authorization
#[braid(serde)]
pub struct Scope;
