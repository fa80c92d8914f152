use anyhow::{Context, Result, bail};
use offerswap_core::SqliteListStore;
use offerswap_core::models::{ListItem, Offer};
use offerswap_core::search::CandidateSearch;
use serde::{Deserialize, Serialize};

/// Fixture loaded by `offerswap seed`. Items default their name and brand
/// to those of the offer they reference.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct SeedFixture {
    #[serde(default)]
    pub offers: Vec<Offer>,
    #[serde(default)]
    pub lists: Vec<SeedList>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct SeedList {
    pub list_id: String,
    pub owner_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub items: Vec<SeedItem>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct SeedItem {
    pub item_id: String,
    pub offer_id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

const fn default_quantity() -> u32 {
    1
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub(crate) struct SeedReport {
    pub offers: usize,
    pub lists: usize,
    pub items: usize,
    pub catalog_version: u64,
}

pub(crate) fn apply_fixture(store: &SqliteListStore, fixture: &SeedFixture) -> Result<SeedReport> {
    for offer in &fixture.offers {
        if offer.valid_until <= offer.valid_from {
            bail!("offer {} ends before it starts", offer.offer_id);
        }
        store
            .upsert_offer(offer)
            .with_context(|| format!("failed to store offer {}", offer.offer_id))?;
    }

    let mut items = 0usize;
    for list in &fixture.lists {
        store
            .create_list(&list.list_id, &list.owner_id, &list.name)
            .with_context(|| format!("failed to create list {}", list.list_id))?;
        for item in &list.items {
            let Some(offer) = store.offer(&item.offer_id)? else {
                bail!(
                    "item {} references unknown offer {}",
                    item.item_id,
                    item.offer_id
                );
            };
            store.add_list_item(&list_item(list, item, &offer))?;
            items += 1;
        }
    }

    Ok(SeedReport {
        offers: fixture.offers.len(),
        lists: fixture.lists.len(),
        items,
        catalog_version: store.catalog_version()?,
    })
}

fn list_item(list: &SeedList, item: &SeedItem, offer: &Offer) -> ListItem {
    ListItem {
        item_id: item.item_id.clone(),
        list_id: list.list_id.clone(),
        offer_id: item.offer_id.clone(),
        name: item.name.clone().unwrap_or_else(|| offer.name.clone()),
        brand: item.brand.clone().or_else(|| offer.brand.clone()),
        quantity: item.quantity.max(1),
    }
}
