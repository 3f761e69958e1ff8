use serde::Serialize;
use thiserror::Error;

use sendwatch_core::{Campaign, CampaignId};

use crate::Capabilities;

#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuthzError {
    #[error("forbidden: missing permission 'campaigns.manage'")]
    CannotManageCampaigns,

    #[error("forbidden: campaign {campaign_id} is owned by another user")]
    NotOwner { campaign_id: CampaignId },
}

/// Edit-rights policy shared by every campaign command.
///
/// `is_admin OR campaign.user_id == current_user.id`
///
/// - No IO
/// - No panics
pub fn can_edit(caps: &Capabilities, campaign: &Campaign) -> bool {
    caps.is_admin || campaign.is_owned_by(caps.user_id())
}

/// Full client-side gate for a campaign command.
///
/// Requires the management capability and edit rights on the campaign.
/// This is a UX gate only: the engine performs its own check.
pub fn authorize_edit(caps: &Capabilities, campaign: &Campaign) -> Result<(), AuthzError> {
    if !caps.can_manage_campaigns {
        tracing::debug!(user_id = %caps.user_id(), "campaign command denied: no manage capability");
        return Err(AuthzError::CannotManageCampaigns);
    }

    if !can_edit(caps, campaign) {
        tracing::debug!(
            user_id = %caps.user_id(),
            campaign_id = %campaign.id,
            "campaign command denied: not owner"
        );
        return Err(AuthzError::NotOwner {
            campaign_id: campaign.id,
        });
    }

    Ok(())
}
