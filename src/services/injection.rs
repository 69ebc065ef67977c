use crate::error::Result;
use crate::events::{UiAction, UiNode, UiSnapshot};
use crate::services::automation::SuccessPredicate;
use crate::{debug_if_enabled, trace_if_enabled};

const URL_BAR_ID: &str = "url_bar";
const SEARCH_BOX_ID: &str = "search_box_text";

/// Предикат для браузеров семейства Chromium: вводит URL в адресную строку.
///
/// На новой вкладке инкогнито сначала виден только поиск, поэтому первый
/// подходящий снимок может лишь кликнуть по нему; ввод произойдёт на
/// следующем событии, когда появится редактируемая адресная строка.
pub fn omnibox_injector(url: &str) -> SuccessPredicate {
    let url = url.to_string();
    Box::new(move |snapshot: &UiSnapshot| put_url(snapshot, &url))
}

pub fn put_url(snapshot: &UiSnapshot, url: &str) -> Result<bool> {
    let nodes = snapshot.root().walk();
    trace_if_enabled!("-----");
    for node in &nodes {
        trace_if_enabled!("Узел: {}", node);
    }

    if let Some(url_bar) = nodes.iter().find(|n| is_url_bar(n)) {
        snapshot.perform(url_bar, UiAction::Focus)?;
        snapshot.perform(url_bar, UiAction::SetText(url.to_string()))?;
        snapshot.perform(url_bar, UiAction::ImeEnter)?;
        debug_if_enabled!("URL введён в узел #{} приложения {}", url_bar.id, snapshot.app());
        return Ok(true);
    }

    if let Some(search_box) = nodes.iter().find(|n| n.resource_id_ends_with(SEARCH_BOX_ID)) {
        debug_if_enabled!("Адресная строка не найдена, открываем поиск #{}", search_box.id);
        snapshot.perform(search_box, UiAction::Click)?;
    }

    Ok(false)
}

fn is_url_bar(node: &UiNode) -> bool {
    node.editable && (node.resource_id_ends_with(URL_BAR_ID) || node.resource_id_ends_with(SEARCH_BOX_ID))
}
