use crate::commands::{self, GroupFilter, GroupInfo, GroupList, XoverEntries};
use crate::response::{NntpResponse, codes};
use crate::{NntpClient, NntpError, Result};
use tracing::debug;

use super::ConnectionState;

fn unexpected(reply: NntpResponse) -> NntpError {
    NntpError::Protocol {
        code: reply.code,
        message: reply.message,
    }
}

impl NntpClient {
    /// GROUP, skipped when `newsgroup` is already the selected group
    ///
    /// # Errors
    ///
    /// [`NntpError::NoSuchGroup`] on 411, [`NntpError::Protocol`] for other
    /// refusals.
    pub async fn join_group(&mut self, newsgroup: &str) -> Result<GroupInfo> {
        if let Some(selected) = self.current_group.as_ref().filter(|g| g.name == newsgroup) {
            return Ok(selected.clone());
        }

        self.send_command(&commands::group(newsgroup)).await?;
        let reply = self.read_response().await?;
        if reply.code == codes::NO_SUCH_GROUP {
            return Err(NntpError::NoSuchGroup(newsgroup.to_string()));
        }
        let info = GroupInfo {
            name: newsgroup.to_string(),
            ..commands::parse_group_response(newsgroup, reply)?
        };
        debug!("{}: {} articles, {}-{}", newsgroup, info.count, info.first, info.last);
        self.current_group = Some(info.clone());
        Ok(info)
    }

    /// LIST ACTIVE, narrowed by `filter`
    ///
    /// Prefix filters such as `alt.binaries.*` go to the server as a
    /// wildmat; other filters are matched here.
    pub async fn list_groups(&mut self, filter: Option<&str>) -> Result<GroupList> {
        let filter = filter.map(GroupFilter::parse);
        let wildmat = filter.as_ref().and_then(GroupFilter::wildmat);
        self.send_command(&commands::list_active(wildmat.as_deref())).await?;

        let reply = self.read_multiline_response().await?;
        if reply.code != codes::LIST_INFORMATION_FOLLOWS {
            return Err(unexpected(reply));
        }
        Ok(GroupList::new(reply.lines, filter))
    }

    /// XOVER over an inclusive range of the selected group
    ///
    /// A range with no articles (423) yields no entries.
    pub async fn xover(&mut self, start: u64, end: u64) -> Result<XoverEntries> {
        self.send_command(&commands::xover(start, end)).await?;
        let reply = self.read_multiline_response().await?;
        match reply.code {
            codes::OVERVIEW_INFO_FOLLOWS => Ok(XoverEntries::new(reply.lines)),
            codes::NO_SUCH_ARTICLE_NUMBER => Ok(XoverEntries::new(Vec::new())),
            _ => Err(unexpected(reply)),
        }
    }

    /// Say goodbye and retire the session; transport errors are ignored
    pub async fn quit(&mut self) -> Result<()> {
        if self.state == ConnectionState::Closed {
            return Ok(());
        }
        if self.send_command(commands::quit()).await.is_ok() {
            let _ = self.read_response().await;
        }
        self.state = ConnectionState::Closed;
        self.mark_broken();
        Ok(())
    }
}
