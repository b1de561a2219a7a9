// Lightning Network peer engine implementing the BOLT channel protocols.
//
// Written in 2022 by the lnpeer contributors.
//
// To the extent possible under law, the author(s) have dedicated all
// copyright and related and neighboring rights to this software to
// the public domain worldwide. This software is distributed without
// any warranty.
//
// You should have received a copy of the MIT License
// along with this software.
// If not, see <https://opensource.org/licenses/MIT>.

//! Channel parameter negotiation: the values offered to the peer and
//! the policy limits applied to values the peer proposes.

use std::ops::Range;

use crate::wire::{AcceptChannel, OpenChannel};
use crate::HTLC_MAX;

/// Limit for the maximum number of accepted HTLCs towards some node.
pub const MAX_ACCEPTED_HTLC_LIMIT: u16 = 483;

/// Protocol minimum for the dust limit.
pub const MIN_DUST_LIMIT: u64 = 354;

/// Errors from policy validation of `open_channel` and
/// `accept_channel` parameters.
#[derive(Clone, PartialEq, Eq, Hash, Debug, Display, Error)]
#[display(doc_comments)]
pub enum PolicyError {
    /// proposed `to_self_delay` of {proposed} blocks exceeds the local
    /// policy limit of {allowed_maximum}
    ToSelfDelayUnreasonablyLarge { proposed: u16, allowed_maximum: u16 },

    /// proposed maximum of {0} accepted HTLCs exceeds the protocol
    /// limit of 483
    MaxAcceptedHtlcLimitExceeded(u16),

    /// proposed fee rate of {proposed} sat/kw lies outside the
    /// acceptable range {lowest_accepted}..{highest_accepted} sat/kw
    FeeRateUnreasonable {
        proposed: u32,
        lowest_accepted: u32,
        highest_accepted: u32,
    },

    /// dust limit of {0} sat is below the protocol minimum of 354 sat
    DustLimitTooSmall(u64),

    /// dust limit of {proposed} sat exceeds the local policy limit of
    /// {allowed_maximum} sat
    DustLimitTooLarge { proposed: u64, allowed_maximum: u64 },

    /// channel reserve of {reserve} sat is below the dust limit of
    /// {dust_limit} sat
    ChannelReserveLessDust { reserve: u64, dust_limit: u64 },

    /// channel funding of {proposed} sat is below the local policy
    /// minimum of {required_minimum} sat
    ChannelFundingTooSmall {
        proposed: u64,
        required_minimum: u64,
    },

    /// pushed amount of {push_msat} msat exceeds the channel funding of
    /// {funding_satoshis} sat
    PushExceedsFunding {
        push_msat: u64,
        funding_satoshis: u64,
    },

    /// HTLC minimum of {proposed} msat exceeds the local policy limit
    /// of {allowed_maximum} msat
    HtlcMinimumTooLarge { proposed: u64, allowed_maximum: u64 },

    /// required funding depth of {proposed} confirmations exceeds the
    /// local policy limit of {allowed_maximum}
    UnreasonableMinDepth { proposed: u32, allowed_maximum: u32 },
}

/// Channel parameters one side commits to in its `open_channel` or
/// `accept_channel` message.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct PeerParams {
    /// The threshold below which outputs should not be generated for
    /// this side's commitment transaction.
    pub dust_limit_satoshis: u64,

    /// The maximum inbound HTLC value in flight towards this side, in
    /// millisatoshi.
    pub max_htlc_value_in_flight_msat: u64,

    /// The minimum value unencumbered by HTLCs for the counterparty to
    /// keep in the channel.
    pub channel_reserve_satoshis: u64,

    /// The minimum HTLC size incoming to this side, in millisatoshi.
    pub htlc_minimum_msat: u64,

    /// The number of blocks the *other* side's to-local output is
    /// delayed after it broadcasts its commitment.
    pub to_self_delay: u16,

    /// The maximum number of inbound HTLCs towards this side.
    pub max_accepted_htlcs: u16,
}

impl Default for PeerParams {
    fn default() -> Self {
        PeerParams {
            dust_limit_satoshis: 546,
            max_htlc_value_in_flight_msat: u64::MAX,
            channel_reserve_satoshis: 1_000,
            htlc_minimum_msat: 0,
            to_self_delay: 144,
            max_accepted_htlcs: HTLC_MAX as u16,
        }
    }
}

impl From<&OpenChannel> for PeerParams {
    fn from(open_channel: &OpenChannel) -> Self {
        PeerParams {
            dust_limit_satoshis: open_channel.dust_limit_satoshis,
            max_htlc_value_in_flight_msat: open_channel
                .max_htlc_value_in_flight_msat,
            channel_reserve_satoshis: open_channel.channel_reserve_satoshis,
            htlc_minimum_msat: open_channel.htlc_minimum_msat,
            to_self_delay: open_channel.to_self_delay,
            max_accepted_htlcs: open_channel.max_accepted_htlcs,
        }
    }
}

impl From<&AcceptChannel> for PeerParams {
    fn from(accept_channel: &AcceptChannel) -> Self {
        PeerParams {
            dust_limit_satoshis: accept_channel.dust_limit_satoshis,
            max_htlc_value_in_flight_msat: accept_channel
                .max_htlc_value_in_flight_msat,
            channel_reserve_satoshis: accept_channel.channel_reserve_satoshis,
            htlc_minimum_msat: accept_channel.htlc_minimum_msat,
            to_self_delay: accept_channel.to_self_delay,
            max_accepted_htlcs: accept_channel.max_accepted_htlcs,
        }
    }
}

/// Parameters common to both channel sides.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct CommonParams {
    /// Commitment fee rate in satoshi per 1000-weight.
    pub feerate_per_kw: u32,

    /// Confirmations the funding transaction needs before the channel
    /// can lock.
    pub minimum_depth: u32,

    /// Whether the channel should be announced through gossip.
    pub announce_channel: bool,
}

impl Default for CommonParams {
    fn default() -> Self {
        CommonParams {
            feerate_per_kw: 500,
            minimum_depth: 3,
            announce_channel: true,
        }
    }
}

/// Policy for accepting channel parameters proposed by a remote peer.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Policy {
    /// Largest acceptable `to_self_delay` requirement, in blocks.
    pub to_self_delay_max: u16,

    /// Range of acceptable commitment fee rates.
    pub feerate_per_kw_range: Range<u32>,

    /// Largest acceptable dust limit.
    pub dust_limit_max: u64,

    /// Smallest channel worth opening.
    pub funding_sat_min: u64,

    /// Largest acceptable `htlc_minimum_msat` requirement.
    pub htlc_minimum_msat_max: u64,

    /// Largest acceptable required funding depth.
    pub minimum_depth_max: u32,
}

impl Default for Policy {
    fn default() -> Self {
        Policy {
            to_self_delay_max: 2016,
            feerate_per_kw_range: 253..100_000,
            dust_limit_max: 10_000,
            funding_sat_min: 10_000,
            htlc_minimum_msat_max: 100_000,
            minimum_depth_max: 144,
        }
    }
}

impl Policy {
    /// Validates an inbound `open_channel` proposal, returning the
    /// peer's parameters on success.
    pub fn validate_inbound(
        &self,
        open_channel: &OpenChannel,
    ) -> Result<PeerParams, PolicyError> {
        let params = PeerParams::from(open_channel);
        self.validate_peer_params(&params)?;

        if open_channel.funding_satoshis < self.funding_sat_min {
            return Err(PolicyError::ChannelFundingTooSmall {
                proposed: open_channel.funding_satoshis,
                required_minimum: self.funding_sat_min,
            });
        }
        if open_channel.push_msat > open_channel.funding_satoshis * 1000 {
            return Err(PolicyError::PushExceedsFunding {
                push_msat: open_channel.push_msat,
                funding_satoshis: open_channel.funding_satoshis,
            });
        }
        if !self
            .feerate_per_kw_range
            .contains(&open_channel.feerate_per_kw)
        {
            return Err(PolicyError::FeeRateUnreasonable {
                proposed: open_channel.feerate_per_kw,
                lowest_accepted: self.feerate_per_kw_range.start,
                highest_accepted: self.feerate_per_kw_range.end,
            });
        }
        Ok(params)
    }

    /// Validates the `accept_channel` answer to our own proposal,
    /// returning the peer's parameters on success.
    pub fn confirm_outbound(
        &self,
        accept_channel: &AcceptChannel,
    ) -> Result<PeerParams, PolicyError> {
        let params = PeerParams::from(accept_channel);
        self.validate_peer_params(&params)?;

        if accept_channel.minimum_depth > self.minimum_depth_max {
            return Err(PolicyError::UnreasonableMinDepth {
                proposed: accept_channel.minimum_depth,
                allowed_maximum: self.minimum_depth_max,
            });
        }
        Ok(params)
    }

    fn validate_peer_params(
        &self,
        params: &PeerParams,
    ) -> Result<(), PolicyError> {
        if params.to_self_delay > self.to_self_delay_max {
            return Err(PolicyError::ToSelfDelayUnreasonablyLarge {
                proposed: params.to_self_delay,
                allowed_maximum: self.to_self_delay_max,
            });
        }
        if params.max_accepted_htlcs > MAX_ACCEPTED_HTLC_LIMIT {
            return Err(PolicyError::MaxAcceptedHtlcLimitExceeded(
                params.max_accepted_htlcs,
            ));
        }
        if params.dust_limit_satoshis < MIN_DUST_LIMIT {
            return Err(PolicyError::DustLimitTooSmall(
                params.dust_limit_satoshis,
            ));
        }
        if params.dust_limit_satoshis > self.dust_limit_max {
            return Err(PolicyError::DustLimitTooLarge {
                proposed: params.dust_limit_satoshis,
                allowed_maximum: self.dust_limit_max,
            });
        }
        if params.channel_reserve_satoshis < params.dust_limit_satoshis {
            return Err(PolicyError::ChannelReserveLessDust {
                reserve: params.channel_reserve_satoshis,
                dust_limit: params.dust_limit_satoshis,
            });
        }
        if params.htlc_minimum_msat > self.htlc_minimum_msat_max {
            return Err(PolicyError::HtlcMinimumTooLarge {
                proposed: params.htlc_minimum_msat,
                allowed_maximum: self.htlc_minimum_msat_max,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::wire::TempChannelId;
    use secp256k1::{PublicKey, SecretKey, SECP256K1};

    fn pk(byte: u8) -> PublicKey {
        PublicKey::from_secret_key(
            SECP256K1,
            &SecretKey::from_slice(&[byte; 32]).unwrap(),
        )
    }

    fn open_channel() -> OpenChannel {
        OpenChannel {
            temporary_channel_id: TempChannelId::random(),
            funding_satoshis: 1_000_000,
            push_msat: 100_000_000,
            dust_limit_satoshis: 546,
            max_htlc_value_in_flight_msat: u64::MAX,
            channel_reserve_satoshis: 1_000,
            htlc_minimum_msat: 1_000,
            feerate_per_kw: 500,
            to_self_delay: 144,
            max_accepted_htlcs: 6,
            funding_pubkey: pk(1),
            revocation_basepoint: pk(2),
            payment_basepoint: pk(3),
            delayed_payment_basepoint: pk(4),
            first_per_commitment_point: pk(5),
        }
    }

    #[test]
    fn default_open_accepted() {
        let policy = Policy::default();
        let params = policy.validate_inbound(&open_channel()).unwrap();
        assert_eq!(params.to_self_delay, 144);
        assert_eq!(params.max_accepted_htlcs, 6);
    }

    #[test]
    fn oversized_push_rejected() {
        let policy = Policy::default();
        let mut open = open_channel();
        open.push_msat = open.funding_satoshis * 1000 + 1;
        assert!(matches!(
            policy.validate_inbound(&open),
            Err(PolicyError::PushExceedsFunding { .. })
        ));
    }

    #[test]
    fn tiny_dust_rejected() {
        let policy = Policy::default();
        let mut open = open_channel();
        open.dust_limit_satoshis = 100;
        assert_eq!(
            policy.validate_inbound(&open),
            Err(PolicyError::DustLimitTooSmall(100))
        );
    }

    #[test]
    fn excessive_htlc_count_rejected() {
        let policy = Policy::default();
        let mut open = open_channel();
        open.max_accepted_htlcs = 484;
        assert_eq!(
            policy.validate_inbound(&open),
            Err(PolicyError::MaxAcceptedHtlcLimitExceeded(484))
        );
    }
}
