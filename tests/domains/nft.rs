use std::collections::HashMap;
use std::sync::Mutex;

use indexed_sync::domain::nft::{
    plan_mint, CollectionStats, MintRefusal, MintStats, NftAction, Token, TokenViewer,
};
use indexed_sync::{
    ActError, Address, Aggregator, HandlerDispatcher, InMemoryRecordSource, MutationError,
    SyncConfig, Synchronizer,
};

use crate::support::{alice, bob, reverted};

const PRICE: u128 = 10_000_000_000_000_000;

type TokenSource = InMemoryRecordSource<Token, TokenViewer>;

struct Collection {
    tokens: TokenSource,
    stats: Mutex<CollectionStats>,
    accounts: Mutex<HashMap<Address, MintStats>>,
}

impl Collection {
    fn stats(&self) -> CollectionStats {
        self.stats.lock().unwrap().clone()
    }

    fn mint_stats(&self, account: &Address) -> MintStats {
        self.accounts
            .lock()
            .unwrap()
            .get(account)
            .cloned()
            .unwrap_or(MintStats {
                mint_price: PRICE,
                ..MintStats::default()
            })
    }

    fn mint_to(&self, owner: &Address, token_uri: &str) -> Result<(), MutationError> {
        let mut stats = self.stats.lock().unwrap();
        if stats.sold_out() {
            return Err(MutationError::rejected("Max supply reached"));
        }
        let id = self
            .tokens
            .append(Token {
                id: stats.current_supply,
                token_uri: token_uri.to_string(),
                owner: owner.clone(),
            })
            .map_err(reverted)?;
        self.tokens
            .set_viewer_state(id, owner, TokenViewer { owned: true })
            .map_err(reverted)?;
        stats.current_supply += 1;

        let mut accounts = self.accounts.lock().unwrap();
        accounts
            .entry(owner.clone())
            .or_insert(MintStats {
                mint_price: PRICE,
                ..MintStats::default()
            })
            .minted += 1;
        Ok(())
    }
}

fn collection_contract(tokens: TokenSource, max_supply: u64) -> HandlerDispatcher<Collection> {
    let state = Collection {
        tokens,
        stats: Mutex::new(CollectionStats {
            current_supply: 0,
            max_supply,
            mint_price: PRICE,
            minting_enabled: true,
            public_mint_enabled: true,
        }),
        accounts: Mutex::new(HashMap::from([(
            alice(),
            MintStats {
                minted: 0,
                remaining_free_mints: 1,
                whitelisted: true,
                mint_price: 0,
            },
        )])),
    };
    HandlerDispatcher::new(state)
        .handler_guarded(
            "freeMint",
            |ctx| ctx.state().stats().minting_enabled,
            |ctx| {
                let sender = ctx.sender()?.clone();
                let state = ctx.state();
                let account = state.mint_stats(&sender);
                if !account.whitelisted || account.remaining_free_mints == 0 {
                    return Err(MutationError::rejected("No free mints remaining"));
                }
                state.mint_to(&sender, ctx.string(0)?)?;
                if let Some(account) = state.accounts.lock().unwrap().get_mut(&sender) {
                    account.remaining_free_mints -= 1;
                }
                Ok(())
            },
        )
        .handler_guarded(
            "mint",
            |ctx| ctx.state().stats().minting_enabled,
            |ctx| {
                let sender = ctx.sender()?.clone();
                let state = ctx.state();
                let stats = state.stats();
                if !stats.public_mint_enabled && !state.mint_stats(&sender).whitelisted {
                    return Err(MutationError::rejected("Public minting disabled"));
                }
                if ctx.value() < stats.mint_price {
                    return Err(MutationError::rejected("Insufficient payment"));
                }
                state.mint_to(&sender, ctx.string(0)?)
            },
        )
}

fn nft_sync(max_supply: u64) -> Synchronizer<TokenSource, HandlerDispatcher<Collection>> {
    let tokens = TokenSource::new();
    Synchronizer::new(
        Aggregator::new(tokens.clone())
            .with_config(SyncConfig::default().with_background_refresh(false)),
        collection_contract(tokens, max_supply),
    )
}

fn planned_mint(
    sync: &Synchronizer<TokenSource, HandlerDispatcher<Collection>>,
    token_uri: &str,
    balance: Option<u128>,
) -> Result<NftAction, MintRefusal> {
    let viewer = sync.viewer().unwrap();
    let collection = sync.dispatcher().state();
    let stats = collection.stats();
    let mint_stats = viewer.as_ref().map(|v| collection.mint_stats(v));
    plan_mint(
        viewer.as_ref(),
        token_uri,
        Some(&stats),
        mint_stats.as_ref(),
        balance,
    )
}

#[tokio::test]
async fn whitelisted_free_mint_then_paid_mint() {
    let sync = nft_sync(10);
    sync.set_viewer(Some(alice())).unwrap();
    assert!(sync.get_snapshot().await.unwrap().is_empty());

    let first = planned_mint(&sync, "ipfs://one", Some(0)).unwrap();
    assert!(matches!(first, NftAction::FreeMint { .. }));
    sync.act(&first).await.unwrap();

    let snapshot = sync.get_snapshot().await.unwrap();
    assert_eq!(snapshot.count, 1);
    let entry = snapshot.get(0).unwrap();
    assert_eq!(entry.record.owner, alice());
    assert_eq!(entry.viewer_state, Some(TokenViewer { owned: true }));

    // Free mints are used up; the next one costs the collection price.
    let second = planned_mint(&sync, "ipfs://two", Some(PRICE)).unwrap();
    assert_eq!(
        second,
        NftAction::Mint {
            token_uri: "ipfs://two".into(),
            price: PRICE,
        }
    );
    sync.act(&second).await.unwrap();
    assert_eq!(sync.get_snapshot().await.unwrap().count, 2);
}

#[tokio::test]
async fn other_accounts_do_not_own_minted_tokens() {
    let sync = nft_sync(10);
    sync.set_viewer(Some(alice())).unwrap();
    let action = planned_mint(&sync, "ipfs://one", None).unwrap();
    sync.act(&action).await.unwrap();

    sync.set_viewer(Some(bob())).unwrap();
    let snapshot = sync.get_snapshot().await.unwrap();

    assert_eq!(
        snapshot.get(0).unwrap().viewer_state,
        Some(TokenViewer { owned: false })
    );
}

#[tokio::test]
async fn refusals_come_before_submit() {
    let sync = nft_sync(1);
    assert_eq!(
        planned_mint(&sync, "ipfs://one", None),
        Err(MintRefusal::WalletNotConnected)
    );

    sync.set_viewer(Some(bob())).unwrap();
    assert_eq!(
        planned_mint(&sync, "ipfs://one", Some(PRICE - 1)),
        Err(MintRefusal::InsufficientBalance {
            needed: PRICE,
            available: PRICE - 1,
        })
    );

    let paid = planned_mint(&sync, "ipfs://one", Some(PRICE)).unwrap();
    sync.act(&paid).await.unwrap();
    assert_eq!(
        planned_mint(&sync, "ipfs://two", Some(PRICE)),
        Err(MintRefusal::SoldOut)
    );
}

#[tokio::test]
async fn contract_rechecks_a_stale_plan() {
    let sync = nft_sync(10);
    sync.set_viewer(Some(bob())).unwrap();
    let paid = planned_mint(&sync, "ipfs://one", None).unwrap();

    sync.dispatcher().state().stats.lock().unwrap().public_mint_enabled = false;
    let err = sync.act(&paid).await.unwrap_err();

    assert_eq!(
        err,
        ActError::Mutation(MutationError::rejected("Public minting disabled"))
    );
    assert!(sync.get_snapshot().await.unwrap().is_empty());
}

#[tokio::test]
async fn disabled_minting_fails_the_guard() {
    let sync = nft_sync(10);
    sync.set_viewer(Some(alice())).unwrap();
    let action = planned_mint(&sync, "ipfs://one", None).unwrap();

    sync.dispatcher().state().stats.lock().unwrap().minting_enabled = false;
    let err = sync.act(&action).await.unwrap_err();

    assert_eq!(
        err,
        ActError::Mutation(MutationError::rejected("precondition failed: freeMint"))
    );
}
