//! Admin moderation payloads.

use bytes::{BufMut, Bytes, BytesMut};

use super::{BanInfo, Wire};
use crate::error::WireError;
use crate::wire::*;

/// BAN_USER (admin). A shadowban accepts the target's posts but hides them
/// from everyone else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BanUser {
    /// Nickname to ban (registered or anonymous).
    pub nickname: String,
    /// Operator-supplied reason.
    pub reason: String,
    /// Whether this is a shadowban.
    pub shadowban: bool,
    /// Duration in hours; absent = permanent.
    pub duration_hours: Option<u32>,
}

impl Wire for BanUser {
    fn encode(&self, buf: &mut BytesMut) {
        put_string(buf, &self.nickname);
        put_string(buf, &self.reason);
        put_bool(buf, self.shadowban);
        put_opt(buf, &self.duration_hours, |b, v| b.put_u32(*v));
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            nickname: get_string(buf)?,
            reason: get_string(buf)?,
            shadowban: get_bool(buf)?,
            duration_hours: get_opt(buf, get_u32)?,
        })
    }
}

/// BAN_IP (admin): exact address or CIDR block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BanIp {
    /// Address or CIDR, e.g. `203.0.113.7` or `203.0.113.0/24`.
    pub ip_or_cidr: String,
    /// Operator-supplied reason.
    pub reason: String,
    /// Duration in hours; absent = permanent.
    pub duration_hours: Option<u32>,
}

impl Wire for BanIp {
    fn encode(&self, buf: &mut BytesMut) {
        put_string(buf, &self.ip_or_cidr);
        put_string(buf, &self.reason);
        put_opt(buf, &self.duration_hours, |b, v| b.put_u32(*v));
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            ip_or_cidr: get_string(buf)?,
            reason: get_string(buf)?,
            duration_hours: get_opt(buf, get_u32)?,
        })
    }
}

/// UNBAN (admin).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unban {
    /// Ban to lift.
    pub ban_id: u64,
}

impl Wire for Unban {
    fn encode(&self, buf: &mut BytesMut) {
        buf.put_u64(self.ban_id);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            ban_id: get_u64(buf)?,
        })
    }
}

/// BAN_RESPONSE: acknowledges BAN_USER, BAN_IP, and UNBAN.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BanResponse {
    /// Whether the operation was applied.
    pub success: bool,
    /// New or lifted ban id, on success.
    pub ban_id: Option<u64>,
    /// Failure detail.
    pub message: Option<String>,
}

impl Wire for BanResponse {
    fn encode(&self, buf: &mut BytesMut) {
        put_bool(buf, self.success);
        put_opt_u64(buf, self.ban_id);
        put_opt_string(buf, &self.message);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            success: get_bool(buf)?,
            ban_id: get_opt_u64(buf)?,
            message: get_opt_string(buf)?,
        })
    }
}

/// LIST_BANS (admin).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ListBans {
    /// Include expired bans for audit.
    pub include_expired: bool,
}

impl Wire for ListBans {
    fn encode(&self, buf: &mut BytesMut) {
        put_bool(buf, self.include_expired);
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            include_expired: get_bool(buf)?,
        })
    }
}

/// BAN_LIST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BanList {
    /// Bans, newest first.
    pub bans: Vec<BanInfo>,
}

impl Wire for BanList {
    fn encode(&self, buf: &mut BytesMut) {
        put_list(buf, &self.bans, |b, ban| ban.encode(b));
    }

    fn decode(buf: &mut Bytes) -> Result<Self, WireError> {
        Ok(Self {
            bans: get_list(buf, BanInfo::decode)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::super::{round_trip, Message};
    use super::*;

    #[test]
    fn moderation_round_trips() {
        round_trip(Message::BanUser(BanUser {
            nickname: "mallory".into(),
            reason: "spam".into(),
            shadowban: true,
            duration_hours: Some(24),
        }));
        round_trip(Message::BanIp(BanIp {
            ip_or_cidr: "203.0.113.0/24".into(),
            reason: "botnet".into(),
            duration_hours: None,
        }));
        round_trip(Message::Unban(Unban { ban_id: 5 }));
        round_trip(Message::BanResponse(BanResponse {
            success: true,
            ban_id: Some(5),
            message: None,
        }));
        round_trip(Message::ListBans(ListBans {
            include_expired: true,
        }));
        round_trip(Message::BanList(BanList {
            bans: vec![BanInfo {
                id: 5,
                kind: 0,
                user_id: Some(3),
                nickname: Some("mallory".into()),
                ip_or_cidr: None,
                reason: "spam".into(),
                shadow: true,
                banned_at: 1_700_000_000_000,
                banned_until: Some(1_700_086_400_000),
                banned_by: "admin".into(),
            }],
        }));
    }
}
