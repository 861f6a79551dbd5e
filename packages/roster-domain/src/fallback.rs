use serde::{Deserialize, Serialize};

/// Ordered retrieval tiers, each strictly more permissive than the last.
/// The loop never relaxes past [`FallbackTier::CompanySoft`].
#[derive(
	Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum FallbackTier {
	Strict,
	TimeSoft,
	LocationSoft,
	CompanySoft,
}
impl FallbackTier {
	pub const TERMINAL: Self = Self::CompanySoft;

	pub fn next(self) -> Option<Self> {
		match self {
			Self::Strict => Some(Self::TimeSoft),
			Self::TimeSoft => Some(Self::LocationSoft),
			Self::LocationSoft => Some(Self::CompanySoft),
			Self::CompanySoft => None,
		}
	}

	pub fn is_terminal(self) -> bool {
		self == Self::TERMINAL
	}

	pub fn as_i32(self) -> i32 {
		match self {
			Self::Strict => 0,
			Self::TimeSoft => 1,
			Self::LocationSoft => 2,
			Self::CompanySoft => 3,
		}
	}

	pub fn from_i32(value: i32) -> Option<Self> {
		match value {
			0 => Some(Self::Strict),
			1 => Some(Self::TimeSoft),
			2 => Some(Self::LocationSoft),
			3 => Some(Self::CompanySoft),
			_ => None,
		}
	}

	/// The time-window overlap filter only applies at the strict tier.
	pub fn time_filter_applies(self) -> bool {
		self == Self::Strict
	}

	pub fn location_filter_applies(self) -> bool {
		matches!(self, Self::Strict | Self::TimeSoft)
	}

	pub fn company_filter_applies(self) -> bool {
		!matches!(self, Self::CompanySoft)
	}

	/// Penalties only bite once the corresponding filter has been relaxed.
	pub fn time_window_relaxed(self) -> bool {
		self >= Self::TimeSoft
	}

	pub fn location_relaxed(self) -> bool {
		self >= Self::LocationSoft
	}
}
