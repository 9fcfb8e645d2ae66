mod auction;
mod bid;
mod config;
mod event;
mod request;
mod unit;

pub use auction::{AuctionRequest, AuctionStatus};
pub use bid::{Bid, BidStatus, RawBid, ValidationError};
pub use config::CacheConfig;
pub use event::AuctionEvent;
pub use request::BidRequest;
pub use unit::AdUnit;

macro_rules! uuid_wrapper {
    ($struct: ident) => {
        /// A UUID newtype
        #[derive(
            Debug,
            Hash,
            PartialEq,
            Eq,
            Clone,
            Copy,
            serde::Serialize,
            serde::Deserialize,
            PartialOrd,
            Ord,
        )]
        #[serde(transparent)]
        #[repr(transparent)]
        pub struct $struct(uuid::Uuid);

        impl $struct {
            /// Generate a fresh random id
            pub fn random() -> Self {
                Self(uuid::Uuid::new_v4())
            }
        }

        impl From<uuid::Uuid> for $struct {
            fn from(value: uuid::Uuid) -> Self {
                Self(value)
            }
        }

        impl Into<uuid::Uuid> for $struct {
            fn into(self) -> uuid::Uuid {
                self.0
            }
        }

        impl TryFrom<&str> for $struct {
            type Error = <uuid::Uuid as std::str::FromStr>::Err;

            fn try_from(value: &str) -> Result<Self, Self::Error> {
                Ok(Self(<uuid::Uuid as std::str::FromStr>::from_str(value)?))
            }
        }

        impl Into<String> for $struct {
            fn into(self) -> String {
                self.0.to_string()
            }
        }

        impl std::ops::Deref for $struct {
            type Target = uuid::Uuid;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl std::fmt::Display for $struct {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

uuid_wrapper!(AuctionId);
uuid_wrapper!(BidId);
uuid_wrapper!(RequestId);

macro_rules! code_wrapper {
    ($struct: ident) => {
        /// A string-code newtype
        #[derive(
            Debug,
            Hash,
            PartialEq,
            Eq,
            Clone,
            serde::Serialize,
            serde::Deserialize,
            PartialOrd,
            Ord,
        )]
        #[serde(transparent)]
        #[repr(transparent)]
        pub struct $struct(String);

        impl $struct {
            /// View the code as a string slice
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $struct {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<&str> for $struct {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl Into<String> for $struct {
            fn into(self) -> String {
                self.0
            }
        }

        impl std::ops::Deref for $struct {
            type Target = str;

            fn deref(&self) -> &Self::Target {
                &self.0
            }
        }

        impl std::fmt::Display for $struct {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

code_wrapper!(BidderCode);
code_wrapper!(AdUnitCode);
