use clap::Parser;
use data_encoding::HEXLOWER;
use log::{error, LevelFilter};
use std::process;
use utxo_ledger::{
    address_to_pub_key_hash, convert_address, hash_pub_key, Blockchain, Command, LedgerError, Opt,
    ProofOfWork, UTXOSet, Wallets, GLOBAL_CONFIG,
};

fn main() {
    env_logger::builder()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();

    let opt = Opt::parse();
    if let Err(e) = run_command(opt.command) {
        error!("Error: {e}");
        process::exit(1);
    }
}

fn run_command(command: Command) -> Result<(), Box<dyn std::error::Error>> {
    let data_dir = GLOBAL_CONFIG.get_data_dir();
    let mining = GLOBAL_CONFIG.get_mining_config();

    match command {
        Command::Createblockchain { address } => {
            let pub_key_hash = address_to_pub_key_hash(&address)?;
            Blockchain::create_blockchain(&pub_key_hash, &data_dir, mining)?;
            println!("Finished!");
        }
        Command::Createwallet => {
            let mut wallets = Wallets::load(GLOBAL_CONFIG.get_wallet_file())?;
            let address = wallets.create_wallet()?;
            println!("New address is: {address}");
        }
        Command::GetBalance { address } => {
            let pub_key_hash = address_to_pub_key_hash(&address)?;
            let blockchain = Blockchain::open(&data_dir, mining)?;
            let balance = UTXOSet::new(&blockchain).get_balance(&pub_key_hash)?;
            println!("Balance of {address}: {balance}");
        }
        Command::ListAddresses => {
            let wallets = Wallets::load(GLOBAL_CONFIG.get_wallet_file())?;
            for address in wallets.get_addresses() {
                println!("{address}");
            }
        }
        Command::Send { from, to, amount } => {
            address_to_pub_key_hash(&from)?;
            let to_pub_key_hash = address_to_pub_key_hash(&to)?;

            let wallets = Wallets::load(GLOBAL_CONFIG.get_wallet_file())?;
            let wallet = wallets.get_wallet(&from).ok_or_else(|| {
                LedgerError::Wallet(format!("Wallet not found for address: {from}"))
            })?;

            let mut blockchain = Blockchain::open(&data_dir, mining)?;
            blockchain.send(wallet, &to_pub_key_hash, amount)?;
            println!("Success!");
        }
        Command::Printchain => {
            let blockchain = Blockchain::open(&data_dir, mining)?;
            for block in blockchain.iterator() {
                let block = block?;
                println!("Hash: {}", block.get_hash_hex());
                println!(
                    "Prev. hash: {}",
                    HEXLOWER.encode(block.get_pre_block_hash())
                );
                println!("Nonce: {}", block.get_nonce());
                println!("PoW: {}", ProofOfWork::validate(&block));

                for tx in block.get_transactions() {
                    println!("- Transaction {}", HEXLOWER.encode(tx.get_id()));
                    if !tx.is_coinbase() {
                        for input in tx.get_vin() {
                            let address = convert_address(&hash_pub_key(input.get_pub_key()));
                            println!(
                                "-- Input txid = {}, vout = {}, from = {address}",
                                HEXLOWER.encode(input.get_txid()),
                                input.get_vout(),
                            );
                        }
                    }
                    for output in tx.get_vout() {
                        println!(
                            "-- Output value = {}, to = {}",
                            output.get_value(),
                            convert_address(output.get_pub_key_hash()),
                        );
                    }
                }
                println!();
            }
        }
        Command::Verifychain => {
            let blockchain = Blockchain::open(&data_dir, mining)?;
            let count = blockchain.verify_chain()?;
            println!("Chain is valid: {count} blocks checked");
        }
    }
    Ok(())
}
